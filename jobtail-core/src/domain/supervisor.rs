//! Supervisor state machine
//!
//! The transition decision is kept free of I/O so it can be exercised
//! directly; the runner applies the effects each [`Action`] calls for.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::{JobOutcome, WorkloadStatus};

/// Where the supervisor is in the lifetime of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorState {
    Starting,
    RunningCaptured,
    RunningUncaptured,
    RestartingCapture,
    Complete,
    Lost,
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Complete | SupervisorState::Lost)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Starting => "STARTING",
            SupervisorState::RunningCaptured => "RUNNING_CAPTURED",
            SupervisorState::RunningUncaptured => "RUNNING_UNCAPTURED",
            SupervisorState::RestartingCapture => "RESTARTING_CAPTURE",
            SupervisorState::Complete => "COMPLETE",
            SupervisorState::Lost => "LOST",
        };
        write!(f, "{}", name)
    }
}

/// What a tick has to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Workload finished: final snapshot, stop capture, mark done
    Complete,
    /// Soft-failure budget exhausted: final snapshot, stop capture, mark done
    Lost,
    /// Running and captured: routine snapshot
    Observe,
    /// Capture died while running: restart snapshot and a fresh capture
    RestartCapture,
    /// Capture still missing after a failed restart: try again
    RetryCapture,
    /// Nothing observable yet, keep polling
    Wait,
}

/// Decides the action for one tick
///
/// Completion is checked first, so a poll reporting both active and
/// complete never leads to a new capture.
pub fn decide(
    state: SupervisorState,
    status: &WorkloadStatus,
    capture_alive: bool,
    budget_exhausted: bool,
) -> Action {
    if status.finished() {
        return Action::Complete;
    }

    if status.running() {
        return if capture_alive {
            Action::Observe
        } else if state == SupervisorState::RunningUncaptured {
            Action::RetryCapture
        } else {
            Action::RestartCapture
        };
    }

    if budget_exhausted {
        Action::Lost
    } else {
        Action::Wait
    }
}

/// Counters collected over a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub ticks: u32,
    pub restarts: u32,
    pub failed_capture_starts: u32,
}

/// How supervision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupervisorOutcome {
    Complete { outcome: JobOutcome },
    Lost { consecutive_failures: u32 },
    Interrupted,
}

impl SupervisorOutcome {
    pub fn state(&self) -> Option<SupervisorState> {
        match self {
            SupervisorOutcome::Complete { .. } => Some(SupervisorState::Complete),
            SupervisorOutcome::Lost { .. } => Some(SupervisorState::Lost),
            SupervisorOutcome::Interrupted => None,
        }
    }
}
