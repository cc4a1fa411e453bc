//! Workload repository
//!
//! Queries and mutations against the scheduler for one Job. Stateless apart
//! from the kubectl binding; bounded timeouts are applied by the callers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use jobtail_core::domain::descriptor::WorkloadDescriptor;
use jobtail_core::domain::status::JobStatusReport;
use jobtail_core::domain::workload::WorkloadHandle;
use std::time::Duration;

use crate::kubectl::{Kubectl, KubectlOutput};

/// Repository trait for workload operations with the scheduler
#[async_trait]
pub trait WorkloadRepository: Send + Sync {
    /// Fetches the status of a Job
    ///
    /// # Returns
    /// `None` when no Job of that name exists in the namespace
    async fn job_status(&self, namespace: &str, name: &str) -> Result<Option<JobStatusReport>>;

    /// Submits the descriptor
    async fn create(&self, descriptor: &WorkloadDescriptor) -> Result<()>;

    /// Blocks until at least one workload pod is ready
    ///
    /// # Returns
    /// `false` when `timeout` elapsed first
    async fn wait_ready(&self, handle: &WorkloadHandle, timeout: Duration) -> Result<bool>;

    /// Human-readable description of the Job and its pods
    async fn describe(&self, handle: &WorkloadHandle) -> Result<String>;
}

/// kubectl implementation of WorkloadRepository
pub struct KubectlWorkloadRepository {
    kubectl: Kubectl,
    query_timeout: Duration,
}

impl KubectlWorkloadRepository {
    /// Creates a new kubectl workload repository
    ///
    /// # Arguments
    /// * `kubectl` - kubectl bound to the run's access context
    /// * `query_timeout` - Upper bound for each individual kubectl call
    pub fn new(kubectl: Kubectl, query_timeout: Duration) -> Self {
        Self {
            kubectl,
            query_timeout,
        }
    }
}

#[async_trait]
impl WorkloadRepository for KubectlWorkloadRepository {
    async fn job_status(&self, namespace: &str, name: &str) -> Result<Option<JobStatusReport>> {
        let output = self
            .kubectl
            .run(
                &["get", "job", name, "-n", namespace, "-o", "json", "--ignore-not-found"],
                None,
                self.query_timeout,
            )
            .await?
            .into_result("kubectl get job")?;

        if output.stdout.trim().is_empty() {
            return Ok(None);
        }

        let report = JobStatusReport::from_job_json(&output.stdout)
            .context("Failed to parse job status")?;
        Ok(Some(report))
    }

    async fn create(&self, descriptor: &WorkloadDescriptor) -> Result<()> {
        self.kubectl
            .run(
                &["create", "-n", descriptor.namespace.as_str(), "-f", "-"],
                Some(descriptor.source.as_str()),
                self.query_timeout,
            )
            .await?
            .into_result("kubectl create")?;
        Ok(())
    }

    async fn wait_ready(&self, handle: &WorkloadHandle, timeout: Duration) -> Result<bool> {
        let selector = handle.pod_selector();
        let timeout_arg = format!("--timeout={}s", timeout.as_secs().max(1));

        let output = self
            .kubectl
            .run(
                &[
                    "wait",
                    "--for=condition=Ready",
                    "pod",
                    "-l",
                    selector.as_str(),
                    "-n",
                    handle.namespace.as_str(),
                    timeout_arg.as_str(),
                ],
                None,
                timeout + self.query_timeout,
            )
            .await?;

        Ok(output.success())
    }

    async fn describe(&self, handle: &WorkloadHandle) -> Result<String> {
        let selector = handle.pod_selector();
        let namespace = handle.namespace.as_str();

        // Each section stands alone; a Job already gone may still have pods
        let job = self
            .kubectl
            .run(
                &["describe", "job", handle.name.as_str(), "-n", namespace],
                None,
                self.query_timeout,
            )
            .await;

        let pods = self
            .kubectl
            .run(
                &["get", "pods", "-l", selector.as_str(), "-n", namespace, "-o", "wide"],
                None,
                self.query_timeout,
            )
            .await;

        let pod_details = self
            .kubectl
            .run(
                &["describe", "pods", "-l", selector.as_str(), "-n", namespace],
                None,
                self.query_timeout,
            )
            .await;

        Ok(format!(
            "{}\n--- pods ---\n{}\n--- pod details ---\n{}",
            section(job, "kubectl describe job"),
            section(pods, "kubectl get pods"),
            section(pod_details, "kubectl describe pods")
        ))
    }
}

/// Output of one describe section, or the reason it is missing
fn section(result: Result<KubectlOutput>, what: &str) -> String {
    match result.and_then(|output| output.into_result(what)) {
        Ok(output) => output.stdout.trim_end().to_string(),
        Err(e) => format!("unavailable: {:#}", e),
    }
}
