//! Submission service
//!
//! Submits a validated descriptor to the scheduler:
//! - Refusing when a workload of the same name already exists
//! - Creating the workload
//! - Waiting, within the caller's budget, for a pod to become ready

use chrono::Utc;
use jobtail_core::domain::descriptor::WorkloadDescriptor;
use jobtail_core::domain::workload::WorkloadHandle;
use jobtail_core::error::{Result, SupervisorError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::repository::WorkloadRepository;

/// Submission controller
pub struct SubmissionService {
    repository: Arc<dyn WorkloadRepository>,
    query_timeout: Duration,
}

impl SubmissionService {
    pub fn new(repository: Arc<dyn WorkloadRepository>, query_timeout: Duration) -> Self {
        Self {
            repository,
            query_timeout,
        }
    }

    /// Fails with `AlreadyActive` if the workload already exists
    ///
    /// Submission is not idempotent, so any existing Job of the same name
    /// blocks a new run.
    pub async fn ensure_absent(&self, descriptor: &WorkloadDescriptor) -> Result<()> {
        let lookup = tokio::time::timeout(
            self.query_timeout,
            self.repository
                .job_status(&descriptor.namespace, &descriptor.name),
        )
        .await
        .map_err(|_| {
            SupervisorError::Submission(format!(
                "timed out checking for an existing workload {}/{}",
                descriptor.namespace, descriptor.name
            ))
        })?
        .map_err(|e| {
            SupervisorError::Submission(format!(
                "cannot check for an existing workload {}/{}: {:#}",
                descriptor.namespace, descriptor.name, e
            ))
        })?;

        match lookup {
            None => Ok(()),
            Some(report) => {
                warn!(
                    "Workload {}/{} already exists (active={}, succeeded={}, failed={})",
                    descriptor.namespace,
                    descriptor.name,
                    report.active,
                    report.succeeded,
                    report.failed
                );
                Err(SupervisorError::already_active(
                    &descriptor.name,
                    &descriptor.namespace,
                ))
            }
        }
    }

    /// Submits the descriptor and returns the handle of the new workload
    pub async fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<WorkloadHandle> {
        info!(
            "Submitting workload {}/{}",
            descriptor.namespace, descriptor.name
        );

        self.repository
            .create(descriptor)
            .await
            .map_err(|e| SupervisorError::Submission(format!("{:#}", e)))?;

        let handle = WorkloadHandle::new(descriptor, Utc::now());
        info!(
            "Workload {}/{} submitted at {}",
            handle.namespace, handle.name, handle.submitted_at
        );

        Ok(handle)
    }

    /// Waits for at least one ready pod
    ///
    /// # Returns
    /// `false` if no pod became ready within `budget`; the supervisor keeps
    /// going either way.
    pub async fn wait_ready(&self, handle: &WorkloadHandle, budget: Duration) -> bool {
        info!(
            "Waiting up to {:?} for a ready pod of {}/{}",
            budget, handle.namespace, handle.name
        );

        let result = tokio::time::timeout(
            budget + self.query_timeout,
            self.repository.wait_ready(handle, budget),
        )
        .await;

        match result {
            Ok(Ok(true)) => {
                info!("Workload {}/{} has a ready pod", handle.namespace, handle.name);
                true
            }
            Ok(Ok(false)) => {
                warn!(
                    "No pod of {}/{} became ready within {:?}",
                    handle.namespace, handle.name, budget
                );
                false
            }
            Ok(Err(e)) => {
                warn!("Failed waiting for a ready pod: {:#}", e);
                false
            }
            Err(_) => {
                warn!("Timed out waiting for a ready pod after {:?}", budget);
                false
            }
        }
    }
}
