//! Status poller
//!
//! Queries the scheduler for the workload's status once per tick and keeps
//! the consecutive soft-failure count the supervisor uses to declare a
//! workload lost.

use chrono::Utc;
use jobtail_core::domain::status::{JobStatusReport, WorkloadStatus};
use jobtail_core::domain::workload::WorkloadHandle;
use jobtail_core::error::SupervisorError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::repository::WorkloadRepository;

/// Result of one poll
#[derive(Debug)]
pub struct PollReport {
    pub status: WorkloadStatus,
    /// Scheduler's report, absent when the workload was not found or the
    /// query failed
    pub report: Option<JobStatusReport>,
    /// Query failure, absorbed as a soft failure
    pub error: Option<SupervisorError>,
    pub consecutive_soft_failures: u32,
    pub budget_exhausted: bool,
}

/// Polls workload status with a bounded timeout
pub struct StatusPoller {
    repository: Arc<dyn WorkloadRepository>,
    query_timeout: Duration,
    budget: u32,
    consecutive_soft_failures: u32,
}

impl StatusPoller {
    /// Creates a new status poller
    ///
    /// # Arguments
    /// * `repository` - Scheduler access
    /// * `query_timeout` - Upper bound for one status query
    /// * `budget` - Consecutive polls without an active or complete status
    ///   tolerated before the workload counts as lost
    pub fn new(repository: Arc<dyn WorkloadRepository>, query_timeout: Duration, budget: u32) -> Self {
        Self {
            repository,
            query_timeout,
            budget,
            consecutive_soft_failures: 0,
        }
    }

    /// Performs a single status query
    ///
    /// Communication failures and timeouts yield an unknown status. A failed
    /// query or a missing workload counts as a soft failure; an active or
    /// complete poll resets the count. A workload that exists but has no
    /// active pods (e.g. backing off between pod retries) leaves the count
    /// untouched.
    pub async fn poll(&mut self, handle: &WorkloadHandle) -> PollReport {
        let query = self.repository.job_status(&handle.namespace, &handle.name);
        let (status, report, error) = match tokio::time::timeout(self.query_timeout, query).await {
            Ok(Ok(Some(report))) => (report.to_status(Utc::now()), Some(report), None),
            Ok(Ok(None)) => (WorkloadStatus::unknown(Utc::now()), None, None),
            Ok(Err(e)) => (
                WorkloadStatus::unknown(Utc::now()),
                None,
                Some(SupervisorError::SoftPoll(format!("{:#}", e))),
            ),
            Err(_) => (
                WorkloadStatus::unknown(Utc::now()),
                None,
                Some(SupervisorError::SoftPoll(format!(
                    "timed out after {:?}",
                    self.query_timeout
                ))),
            ),
        };

        if report.is_none() {
            self.consecutive_soft_failures += 1;
        } else if !status.vanished() {
            self.consecutive_soft_failures = 0;
        }

        debug!(
            "Polled {}/{}: active={} complete={} soft_failures={}/{}",
            handle.namespace,
            handle.name,
            status.active,
            status.complete,
            self.consecutive_soft_failures,
            self.budget
        );

        PollReport {
            status,
            report,
            error,
            consecutive_soft_failures: self.consecutive_soft_failures,
            budget_exhausted: self.consecutive_soft_failures >= self.budget,
        }
    }
}
