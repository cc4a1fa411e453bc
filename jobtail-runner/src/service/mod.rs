//! Service layer
//!
//! Services hold the business logic around the repositories: submitting a
//! workload and recording diagnostic snapshots.

mod diagnostics;
mod submission;

pub use diagnostics::{DiagnosticsService, SnapshotKind};
pub use submission::SubmissionService;
