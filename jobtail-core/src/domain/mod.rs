//! Core domain types
//!
//! Values describing a single supervised workload: what was asked for
//! (descriptor), what was submitted (handle), what the scheduler reports
//! (status) and where the supervisor currently is (state).

pub mod descriptor;
pub mod status;
pub mod supervisor;
pub mod workload;
