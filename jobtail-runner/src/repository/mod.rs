//! Repository layer
//!
//! Repositories are thin kubectl clients that abstract communication with
//! the scheduler. They provide focused interfaces without any business
//! logic.
//!
//! All repositories are trait-based to enable testing with in-memory fakes.

mod capture;
mod workloads;

// Re-export traits
pub use capture::{CaptureLauncher, CaptureProcess};
pub use workloads::WorkloadRepository;

// Re-export implementations
pub use capture::KubectlCaptureLauncher;
pub use workloads::KubectlWorkloadRepository;
