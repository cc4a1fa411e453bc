//! In-memory fakes for the repository traits

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use jobtail_core::domain::descriptor::WorkloadDescriptor;
use jobtail_core::domain::status::{JobCondition, JobStatusReport};
use jobtail_core::domain::workload::{ContainerSelector, WorkloadHandle};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::artifacts::RunArtifacts;
use crate::config::Config;
use crate::context::RunContext;
use crate::repository::{CaptureLauncher, CaptureProcess, WorkloadRepository};

pub const DEMO_DESCRIPTOR: &str = r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: demo
  namespace: ns1
spec:
  template:
    spec:
      restartPolicy: Never
      containers:
        - name: main
          image: busybox
"#;

pub fn demo_descriptor() -> WorkloadDescriptor {
    WorkloadDescriptor::parse(DEMO_DESCRIPTOR).unwrap()
}

pub fn demo_handle() -> WorkloadHandle {
    WorkloadHandle::new(&demo_descriptor(), Utc::now())
}

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("jobtail-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn scratch_artifacts() -> (PathBuf, RunArtifacts) {
    let dir = scratch_dir();
    let artifacts = RunArtifacts::new(dir.join("logs"), dir.join("done"), "demo", Local::now());
    artifacts.prepare().unwrap();
    (dir, artifacts)
}

/// Run context writing into a fresh scratch directory
pub fn scratch_context() -> (PathBuf, RunContext) {
    let dir = scratch_dir();

    let mut config = Config::new(dir.join("kubeconfig"));
    config.logs_dir = dir.join("logs");
    config.marker_path = dir.join("done");

    let context = RunContext::new(demo_descriptor(), config);
    context.artifacts.prepare().unwrap();
    (dir, context)
}

/// Scripted answer to one status query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Active,
    Complete,
    Failed,
    /// Active pods and a Complete condition in the same report
    CompleteWhileActive,
    /// Job exists but has no active pods
    Inactive,
    Absent,
    Error,
}

impl PollStep {
    fn response(self) -> Result<Option<JobStatusReport>> {
        let condition = |kind: &str| JobCondition {
            condition_type: kind.to_string(),
            status: "True".to_string(),
            reason: None,
            message: None,
        };

        match self {
            PollStep::Active => Ok(Some(JobStatusReport {
                active: 1,
                ..Default::default()
            })),
            PollStep::Complete => Ok(Some(JobStatusReport {
                succeeded: 1,
                conditions: vec![condition("Complete")],
                ..Default::default()
            })),
            PollStep::Failed => Ok(Some(JobStatusReport {
                failed: 2,
                conditions: vec![condition("Failed")],
                ..Default::default()
            })),
            PollStep::CompleteWhileActive => Ok(Some(JobStatusReport {
                active: 1,
                succeeded: 1,
                conditions: vec![condition("Complete")],
                ..Default::default()
            })),
            PollStep::Inactive => Ok(Some(JobStatusReport::default())),
            PollStep::Absent => Ok(None),
            PollStep::Error => Err(anyhow::anyhow!("connection refused")),
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    existing: Option<JobStatusReport>,
    lookup_error: Option<String>,
    create_error: Option<String>,
    describe_error: Option<String>,
    not_ready: bool,
    ready_delay: Option<Duration>,
    submitted: bool,
    create_calls: u32,
    polls: VecDeque<PollStep>,
    last_poll: Option<PollStep>,
}

/// Scheduler fake
///
/// Before the workload is created, status queries answer the pre-existing
/// lookup; afterwards they follow the poll script, repeating its last step.
#[derive(Default)]
pub struct FakeScheduler {
    state: Mutex<SchedulerState>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, report: JobStatusReport) -> Self {
        self.state.lock().unwrap().existing = Some(report);
        self
    }

    pub fn with_lookup_error(self, message: &str) -> Self {
        self.state.lock().unwrap().lookup_error = Some(message.to_string());
        self
    }

    pub fn with_create_error(self, message: &str) -> Self {
        self.state.lock().unwrap().create_error = Some(message.to_string());
        self
    }

    pub fn with_describe_error(self, message: &str) -> Self {
        self.state.lock().unwrap().describe_error = Some(message.to_string());
        self
    }

    pub fn with_ready(self, ready: bool) -> Self {
        self.state.lock().unwrap().not_ready = !ready;
        self
    }

    /// `wait_ready` blocks this long before answering
    pub fn with_ready_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().ready_delay = Some(delay);
        self
    }

    pub fn with_polls(self, polls: Vec<PollStep>) -> Self {
        self.state.lock().unwrap().polls = polls.into();
        self
    }

    /// Skips the pre-submission lookup phase
    pub fn submitted(self) -> Self {
        self.state.lock().unwrap().submitted = true;
        self
    }

    pub fn create_calls(&self) -> u32 {
        self.state.lock().unwrap().create_calls
    }
}

#[async_trait]
impl WorkloadRepository for FakeScheduler {
    async fn job_status(&self, _namespace: &str, _name: &str) -> Result<Option<JobStatusReport>> {
        let mut state = self.state.lock().unwrap();

        if !state.submitted {
            if let Some(message) = &state.lookup_error {
                anyhow::bail!("{}", message);
            }
            return Ok(state.existing.clone());
        }

        let step = match state.polls.pop_front() {
            Some(step) => step,
            None => state.last_poll.unwrap_or(PollStep::Active),
        };
        state.last_poll = Some(step);
        step.response()
    }

    async fn create(&self, _descriptor: &WorkloadDescriptor) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;

        if let Some(message) = &state.create_error {
            anyhow::bail!("{}", message);
        }

        state.submitted = true;
        Ok(())
    }

    async fn wait_ready(&self, _handle: &WorkloadHandle, _timeout: Duration) -> Result<bool> {
        let delay = self.state.lock().unwrap().ready_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(!self.state.lock().unwrap().not_ready)
    }

    async fn describe(&self, handle: &WorkloadHandle) -> Result<String> {
        if let Some(message) = &self.state.lock().unwrap().describe_error {
            anyhow::bail!("{}", message);
        }
        Ok(format!("Name: {}\nNamespace: {}\n", handle.name, handle.namespace))
    }
}

/// Scripted result of one capture start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStep {
    Fail,
    /// Alive for this many liveness checks, then dead; `None` never dies
    Live(Option<u32>),
}

#[derive(Default)]
struct LauncherState {
    steps: VecDeque<LaunchStep>,
    selectors: Vec<ContainerSelector>,
    live: Vec<Arc<AtomicBool>>,
    max_live: usize,
    stops: u32,
}

/// Capture launcher fake recording every start
#[derive(Clone, Default)]
pub struct FakeLauncher {
    state: Arc<Mutex<LauncherState>>,
}

impl FakeLauncher {
    pub fn new(steps: Vec<LaunchStep>) -> Self {
        let launcher = Self::default();
        launcher.state.lock().unwrap().steps = steps.into();
        launcher
    }

    /// Successful starts
    pub fn starts(&self) -> usize {
        self.state.lock().unwrap().live.len()
    }

    pub fn selectors(&self) -> Vec<ContainerSelector> {
        self.state.lock().unwrap().selectors.clone()
    }

    /// Captures not yet observed dead or stopped
    pub fn live_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.live.iter().filter(|a| a.load(Ordering::SeqCst)).count()
    }

    /// Highest number of live captures ever seen at once
    pub fn max_live(&self) -> usize {
        self.state.lock().unwrap().max_live
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().unwrap().stops
    }
}

impl CaptureLauncher for FakeLauncher {
    fn start(
        &self,
        _handle: &WorkloadHandle,
        selector: &ContainerSelector,
    ) -> Result<Box<dyn CaptureProcess>> {
        let mut state = self.state.lock().unwrap();
        state.selectors.push(selector.clone());

        let step = state.steps.pop_front().unwrap_or(LaunchStep::Live(None));
        let checks_left = match step {
            LaunchStep::Fail => anyhow::bail!("kubectl logs could not be spawned"),
            LaunchStep::Live(checks) => checks,
        };

        let alive = Arc::new(AtomicBool::new(true));
        state.live.push(alive.clone());

        let live_now = state.live.iter().filter(|a| a.load(Ordering::SeqCst)).count();
        state.max_live = state.max_live.max(live_now);

        Ok(Box::new(FakeCapture {
            alive,
            checks_left,
            started_at: Utc::now(),
            launcher: self.state.clone(),
        }))
    }
}

struct FakeCapture {
    alive: Arc<AtomicBool>,
    checks_left: Option<u32>,
    started_at: DateTime<Utc>,
    launcher: Arc<Mutex<LauncherState>>,
}

#[async_trait]
impl CaptureProcess for FakeCapture {
    fn id(&self) -> Option<u32> {
        self.alive.load(Ordering::SeqCst).then_some(4242)
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn is_alive(&mut self) -> bool {
        if !self.alive.load(Ordering::SeqCst) {
            return false;
        }

        match self.checks_left {
            Some(0) => {
                self.alive.store(false, Ordering::SeqCst);
                false
            }
            Some(n) => {
                self.checks_left = Some(n - 1);
                true
            }
            None => true,
        }
    }

    async fn wait_exit(&mut self, _grace: Duration) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    async fn stop(&mut self) {
        if self.alive.swap(false, Ordering::SeqCst) {
            self.launcher.lock().unwrap().stops += 1;
        }
    }
}
