//! Jobtail Core
//!
//! Core types for the jobtail log-capture supervisor.
//!
//! This crate contains:
//! - Domain types: workload descriptor, handle, status and supervisor states
//! - Errors: the failure taxonomy shared by the runner
//!
//! Nothing in here performs I/O beyond reading a descriptor file.

pub mod domain;
pub mod error;
