//! Scheduler layer for the runner
//!
//! This layer drives a supervised run: polling the scheduler for workload
//! status and reacting to it, from submission until a terminal state.

pub mod poller;
pub mod supervisor;

pub use supervisor::Supervisor;
