//! Tailing supervisor
//!
//! Drives one workload from submission to a terminal state. Each tick polls
//! status, checks the capture's liveness, asks [`decide`] what to do and
//! applies the effects before the next tick is scheduled.
//!
//! The supervisor is the only owner of the capture handle. A new capture is
//! started only after the previous one was observed dead and dropped, and
//! every path into a terminal state stops the live capture first.

use chrono::{DateTime, Utc};
use jobtail_core::domain::status::{JobOutcome, JobStatusReport};
use jobtail_core::domain::supervisor::{
    Action, RunStats, SupervisorOutcome, SupervisorState, decide,
};
use jobtail_core::domain::workload::{ContainerSelector, WorkloadHandle};
use jobtail_core::error::{Result, SupervisorError};
use std::future::Future;
use std::sync::Arc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::context::RunContext;
use crate::repository::{CaptureLauncher, CaptureProcess, WorkloadRepository};
use crate::scheduler::poller::StatusPoller;
use crate::service::{DiagnosticsService, SnapshotKind, SubmissionService};

/// How a run ended, with its counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorReport {
    pub outcome: SupervisorOutcome,
    pub stats: RunStats,
}

/// Supervisor for a single run
pub struct Supervisor {
    context: RunContext,
    submission: SubmissionService,
    poller: StatusPoller,
    diagnostics: DiagnosticsService,
    launcher: Arc<dyn CaptureLauncher>,
    capture: Option<Box<dyn CaptureProcess>>,
    state: SupervisorState,
    stats: RunStats,
    /// Consecutive failed capture starts
    capture_failures: u32,
    /// Last poll at which a capture was observed alive; restarts resume here
    last_seen_alive: Option<DateTime<Utc>>,
}

impl Supervisor {
    pub fn new(
        context: RunContext,
        repository: Arc<dyn WorkloadRepository>,
        launcher: Arc<dyn CaptureLauncher>,
    ) -> Self {
        let config = &context.config;
        let submission = SubmissionService::new(repository.clone(), config.query_timeout);
        let poller = StatusPoller::new(
            repository.clone(),
            config.query_timeout,
            config.soft_failure_budget,
        );
        let diagnostics =
            DiagnosticsService::new(repository, context.artifacts.clone(), config.query_timeout);

        Self {
            context,
            submission,
            poller,
            diagnostics,
            launcher,
            capture: None,
            state: SupervisorState::Starting,
            stats: RunStats::default(),
            capture_failures: 0,
            last_seen_alive: None,
        }
    }

    /// Runs the supervisor until a terminal state or `shutdown` resolves
    ///
    /// # Errors
    /// Only fatal submission-phase errors are returned; everything after the
    /// workload has been submitted is absorbed and logged.
    pub async fn run<F>(mut self, shutdown: F) -> Result<SupervisorReport>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let prepared = tokio::select! {
            biased;
            _ = &mut shutdown => None,
            result = self.prepare() => Some(result),
        };
        if prepared.transpose()?.is_none() {
            warn!("[{}] Stop requested before submission, nothing was submitted", self.state);
            return Ok(self.report(SupervisorOutcome::Interrupted));
        }

        // Not raced against shutdown: once created, the workload must have a handle
        let handle = self
            .submission
            .submit(&self.context.descriptor)
            .await?;

        let ready_timeout = self.context.config.ready_timeout;
        let stopped = tokio::select! {
            biased;
            _ = &mut shutdown => true,
            _ = self.submission.wait_ready(&handle, ready_timeout) => false,
        };
        if stopped {
            let outcome = self.interrupt(&handle).await;
            return Ok(self.report(outcome));
        }

        self.start_capture(&handle);

        let period = self.context.config.poll_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    let outcome = self.interrupt(&handle).await;
                    return Ok(self.report(outcome));
                }
                _ = ticker.tick() => {}
            }

            if let Some(outcome) = self.tick(&handle).await {
                return Ok(self.report(outcome));
            }
        }
    }

    /// Checks the workload is not already there and resets the marker
    async fn prepare(&mut self) -> Result<()> {
        let descriptor = &self.context.descriptor;
        info!(
            "[{}] Supervising {}/{} (primary container {})",
            self.state, descriptor.namespace, descriptor.name, descriptor.primary_container
        );

        self.submission.ensure_absent(descriptor).await?;

        if self.context.artifacts.is_done() {
            info!(
                "[{}] Removing terminal marker left by an earlier run",
                self.state
            );
        }
        self.context.artifacts.clear_marker().map_err(|e| {
            SupervisorError::Precondition(format!("cannot reset terminal marker: {:#}", e))
        })
    }

    /// Runs one tick to completion
    ///
    /// # Returns
    /// The outcome once a terminal state is reached
    async fn tick(&mut self, handle: &WorkloadHandle) -> Option<SupervisorOutcome> {
        self.stats.ticks += 1;

        let poll = self.poller.poll(handle).await;
        if let Some(e) = &poll.error {
            warn!(
                "[{}] {} ({}/{})",
                self.state,
                e,
                poll.consecutive_soft_failures,
                self.context.config.soft_failure_budget
            );
        }

        let capture_alive = self.capture_alive();
        let action = decide(self.state, &poll.status, capture_alive, poll.budget_exhausted);

        debug!(
            "[{}] tick {}: active={} complete={} capture_alive={} -> {:?}",
            self.state,
            self.stats.ticks,
            poll.status.active,
            poll.status.complete,
            capture_alive,
            action
        );

        match action {
            Action::Complete => {
                let outcome = poll
                    .report
                    .as_ref()
                    .map(JobStatusReport::outcome)
                    .unwrap_or(JobOutcome::Unknown);
                self.complete(handle, poll.report.as_ref(), outcome).await;
                Some(SupervisorOutcome::Complete { outcome })
            }
            Action::Lost => {
                let consecutive_failures = poll.consecutive_soft_failures;
                self.lose(handle, consecutive_failures).await;
                Some(SupervisorOutcome::Lost {
                    consecutive_failures,
                })
            }
            Action::Observe => {
                self.last_seen_alive = Some(poll.status.observed_at);
                self.state = SupervisorState::RunningCaptured;
                self.snapshot(handle, SnapshotKind::Routine, "capture streaming")
                    .await;
                None
            }
            Action::RestartCapture => {
                self.state = SupervisorState::RestartingCapture;
                self.stats.restarts += 1;
                warn!(
                    "[{}] Capture process died while the workload is active, restarting (restart #{})",
                    self.state, self.stats.restarts
                );
                let note = format!("capture restart #{}", self.stats.restarts);
                self.snapshot(handle, SnapshotKind::Restart, &note).await;
                self.start_capture(handle);
                None
            }
            Action::RetryCapture => {
                info!(
                    "[{}] Retrying capture start ({} failed attempt(s) so far)",
                    self.state, self.capture_failures
                );
                self.start_capture(handle);
                None
            }
            Action::Wait => {
                warn!(
                    "[{}] Workload {}/{} is neither active nor complete ({}/{} polls)",
                    self.state,
                    handle.namespace,
                    handle.name,
                    poll.consecutive_soft_failures,
                    self.context.config.soft_failure_budget
                );
                None
            }
        }
    }

    /// Checks the owned capture, dropping it once it has exited
    fn capture_alive(&mut self) -> bool {
        let alive = match self.capture.as_mut() {
            Some(capture) => capture.is_alive(),
            None => false,
        };

        if !alive && self.capture.take().is_some() {
            info!("[{}] Capture process has exited", self.state);
        }

        alive
    }

    /// Starts a capture; only called when no capture is held
    fn start_capture(&mut self, handle: &WorkloadHandle) {
        debug_assert!(self.capture.is_none(), "capture started while another is held");

        let mut selector = ContainerSelector::for_workload(handle);
        if let Some(since) = self.last_seen_alive {
            selector = selector.since(since);
        }

        match self.launcher.start(handle, &selector) {
            Ok(capture) => {
                let (pid, started_at) = (capture.id(), capture.started_at());
                self.capture = Some(capture);
                self.capture_failures = 0;
                self.state = SupervisorState::RunningCaptured;
                info!(
                    "[{}] Capturing container output (pid {:?}, started {})",
                    self.state, pid, started_at
                );
            }
            Err(e) => {
                self.capture_failures += 1;
                self.stats.failed_capture_starts += 1;
                self.state = SupervisorState::RunningUncaptured;

                let error = SupervisorError::CaptureRestart(format!("{:#}", e));
                if self.capture_failures >= self.context.config.capture_warn_after {
                    warn!(
                        "[{}] Capture has failed to start on {} consecutive attempts, workload output is not being recorded: {}",
                        self.state, self.capture_failures, error
                    );
                } else {
                    error!("[{}] {}; retrying next tick", self.state, error);
                }
            }
        }
    }

    /// Stops the live capture, optionally letting it drain first
    async fn stop_capture(&mut self, drain: bool) {
        let Some(mut capture) = self.capture.take() else {
            return;
        };

        if drain {
            let grace = self.context.config.capture_drain_timeout;
            if capture.wait_exit(grace).await {
                return;
            }
            debug!("Capture still running after {:?}, stopping it", grace);
        }

        capture.stop().await;
    }

    async fn complete(
        &mut self,
        handle: &WorkloadHandle,
        report: Option<&JobStatusReport>,
        outcome: JobOutcome,
    ) {
        self.stop_capture(true).await;

        let note = match report {
            Some(r) => format!(
                "outcome {:?}, succeeded={}, failed={}",
                outcome, r.succeeded, r.failed
            ),
            None => format!("outcome {:?}", outcome),
        };
        self.snapshot(handle, SnapshotKind::Completion, &note).await;
        self.mark_done();

        self.state = SupervisorState::Complete;
        info!(
            "[{}] Workload {}/{} finished: {} ({} tick(s), {} capture restart(s))",
            self.state, handle.namespace, handle.name, note, self.stats.ticks, self.stats.restarts
        );
    }

    async fn lose(&mut self, handle: &WorkloadHandle, consecutive_failures: u32) {
        self.stop_capture(false).await;

        let error = SupervisorError::LostWorkload {
            consecutive_failures,
        };
        self.snapshot(handle, SnapshotKind::Completion, &error.to_string())
            .await;
        self.mark_done();

        self.state = SupervisorState::Lost;
        error!(
            "[{}] Workload {}/{}: {} ({} tick(s), {} capture restart(s))",
            self.state,
            handle.namespace,
            handle.name,
            error,
            self.stats.ticks,
            self.stats.restarts
        );
    }

    async fn interrupt(&mut self, handle: &WorkloadHandle) -> SupervisorOutcome {
        warn!("[{}] Stop requested, shutting down", self.state);

        self.stop_capture(false).await;
        self.snapshot(handle, SnapshotKind::Interrupted, "runner stopped by signal")
            .await;

        warn!(
            "[{}] Supervision interrupted after {} tick(s); terminal marker not written",
            self.state, self.stats.ticks
        );
        SupervisorOutcome::Interrupted
    }

    async fn snapshot(&self, handle: &WorkloadHandle, kind: SnapshotKind, note: &str) {
        if let Err(e) = self.diagnostics.snapshot(handle, kind, note).await {
            warn!("[{}] Failed to write {:?} snapshot: {:#}", self.state, kind, e);
        }
    }

    fn mark_done(&self) {
        match self.context.artifacts.mark_done() {
            Ok(()) => info!(
                "[{}] Terminal marker {} created",
                self.state,
                self.context.artifacts.marker_path().display()
            ),
            Err(e) => error!("[{}] {:#}", self.state, e),
        }
    }

    fn report(&self, outcome: SupervisorOutcome) -> SupervisorReport {
        SupervisorReport {
            outcome,
            stats: self.stats,
        }
    }
}
