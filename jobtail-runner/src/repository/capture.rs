//! Log capture process
//!
//! A capture is a background `kubectl logs --follow` child appending the
//! combined, timestamped and prefixed output of every workload container to
//! one file. The supervisor owns the child directly; liveness is read from the
//! child itself, never from the process table.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use jobtail_core::domain::workload::{ContainerSelector, WorkloadHandle};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::kubectl::Kubectl;

/// Pods followed concurrently by one capture
const MAX_LOG_REQUESTS: u32 = 20;

/// Handle on a running capture
#[async_trait]
pub trait CaptureProcess: Send {
    /// OS process id, if still known
    fn id(&self) -> Option<u32>;

    fn started_at(&self) -> DateTime<Utc>;

    /// Whether the capture is still streaming
    fn is_alive(&mut self) -> bool;

    /// Waits up to `grace` for the capture to end by itself
    ///
    /// # Returns
    /// `true` if it exited within the grace period
    async fn wait_exit(&mut self, grace: Duration) -> bool;

    /// Stops the capture and reaps it
    async fn stop(&mut self);
}

/// Starts capture processes
pub trait CaptureLauncher: Send + Sync {
    fn start(
        &self,
        handle: &WorkloadHandle,
        selector: &ContainerSelector,
    ) -> Result<Box<dyn CaptureProcess>>;
}

/// Builds the `kubectl logs` arguments for a selector
fn log_args(handle: &WorkloadHandle, selector: &ContainerSelector) -> Vec<String> {
    let mut args = vec![
        "logs".to_string(),
        "--follow".to_string(),
        "--timestamps".to_string(),
        "--prefix".to_string(),
        "--ignore-errors".to_string(),
        "--all-containers".to_string(),
        format!("--max-log-requests={}", MAX_LOG_REQUESTS),
        "-l".to_string(),
        selector.labels.clone(),
        "-n".to_string(),
        handle.namespace.clone(),
    ];

    if let Some(since) = selector.since {
        args.push(format!(
            "--since-time={}",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }

    args
}

/// kubectl implementation of CaptureLauncher
pub struct KubectlCaptureLauncher {
    kubectl: Kubectl,
    output_path: PathBuf,
}

impl KubectlCaptureLauncher {
    /// Creates a new launcher
    ///
    /// # Arguments
    /// * `kubectl` - kubectl bound to the run's access context
    /// * `output_path` - File every capture of the run appends to
    pub fn new(kubectl: Kubectl, output_path: PathBuf) -> Self {
        Self {
            kubectl,
            output_path,
        }
    }
}

impl CaptureLauncher for KubectlCaptureLauncher {
    fn start(
        &self,
        handle: &WorkloadHandle,
        selector: &ContainerSelector,
    ) -> Result<Box<dyn CaptureProcess>> {
        let stdout = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_path)
            .with_context(|| format!("Failed to open {}", self.output_path.display()))?;
        let stderr = stdout
            .try_clone()
            .context("Failed to duplicate capture file handle")?;

        let args = log_args(handle, selector);
        debug!("Starting capture: kubectl {}", args.join(" "));

        let child = self
            .kubectl
            .command()
            .args(&args)
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .context("Failed to spawn kubectl logs")?;

        let capture = KubectlCapture {
            child,
            started_at: Utc::now(),
        };

        info!(
            "Capture process {:?} started for {}/{} -> {}",
            capture.id(),
            handle.namespace,
            handle.name,
            self.output_path.display()
        );

        Ok(Box::new(capture))
    }
}

/// A running `kubectl logs --follow` child
struct KubectlCapture {
    child: Child,
    started_at: DateTime<Utc>,
}

#[async_trait]
impl CaptureProcess for KubectlCapture {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!("Capture process exited with {}", status);
                false
            }
            Err(e) => {
                warn!("Failed to query capture process: {}", e);
                false
            }
        }
    }

    async fn wait_exit(&mut self, grace: Duration) -> bool {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Capture process drained and exited with {}", status);
                true
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for capture process: {}", e);
                false
            }
            Err(_) => false,
        }
    }

    async fn stop(&mut self) {
        if !self.is_alive() {
            return;
        }

        let pid = self.child.id();
        match self.child.kill().await {
            Ok(()) => info!("Capture process {:?} stopped", pid),
            Err(e) => warn!("Failed to stop capture process {:?}: {}", pid, e),
        }
    }
}
