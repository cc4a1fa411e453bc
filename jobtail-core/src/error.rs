//! Error types for jobtail

use thiserror::Error;

/// Descriptor could not be parsed or is ambiguous
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Descriptor file could not be read
    #[error("cannot read descriptor {path}: {reason}")]
    Read { path: String, reason: String },

    /// Descriptor is not valid YAML
    #[error("descriptor is not valid YAML: {0}")]
    Parse(String),

    #[error("descriptor declares no workload of kind Job")]
    NoJob,

    #[error("descriptor declares {0} workloads of kind Job, expected exactly one")]
    MultipleJobs(usize),

    #[error("Job definition declares no namespace")]
    MissingNamespace,

    #[error("Job definition declares no name")]
    MissingName,

    #[error("Job definition declares no containers")]
    NoContainers,

    #[error("container #{0} of the Job definition has no name")]
    UnnamedContainer(usize),
}

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Failures a supervised run can meet
///
/// Validation, precondition, already-active and submission errors are fatal
/// and abort before the scheduler is mutated. The remaining categories are
/// absorbed by the supervisor loop and only show up in the runner log.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("invalid descriptor: {0}")]
    Validation(#[from] ValidationError),

    /// Missing or unreadable access context
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("workload {namespace}/{name} already exists")]
    AlreadyActive { name: String, namespace: String },

    /// Scheduler rejected or could not receive the descriptor
    #[error("submission failed: {0}")]
    Submission(String),

    /// Transient status query failure
    #[error("status query failed: {0}")]
    SoftPoll(String),

    #[error("workload lost after {consecutive_failures} consecutive polls without status")]
    LostWorkload { consecutive_failures: u32 },

    #[error("capture process failed to start: {0}")]
    CaptureRestart(String),
}

impl SupervisorError {
    pub fn already_active(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::AlreadyActive {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Whether this error aborts the run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Precondition(_) | Self::AlreadyActive { .. } | Self::Submission(_)
        )
    }

    /// Process exit code for a fatal error
    pub fn exit_code(&self) -> u8 {
        if self.is_fatal() { 1 } else { 0 }
    }
}
