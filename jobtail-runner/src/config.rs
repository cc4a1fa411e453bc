//! Runner configuration
//!
//! Defines all configurable parameters for a supervised run including
//! polling intervals, timeouts, artifact locations and scheduler access.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runner configuration
///
/// All timeouts and intervals are configurable so the supervisor can be
/// tuned for slow clusters or exercised quickly in tests.
#[derive(Debug, Clone)]
pub struct Config {
    /// kubectl binary to invoke
    pub kubectl: String,

    /// Access context for the scheduler
    pub kubeconfig: PathBuf,

    /// Directory receiving every run log
    pub logs_dir: PathBuf,

    /// Terminal marker, created once supervision concludes
    pub marker_path: PathBuf,

    /// How often the supervisor polls workload status
    pub poll_interval: Duration,

    /// Budget for at least one workload pod to become ready
    pub ready_timeout: Duration,

    /// Upper bound for a single scheduler query
    pub query_timeout: Duration,

    /// How long a finished workload's capture may keep draining output
    pub capture_drain_timeout: Duration,

    /// Consecutive polls without an active or complete status before the
    /// workload is considered lost
    pub soft_failure_budget: u32,

    /// Consecutive failed capture starts before the failure is reported as
    /// persistent
    pub capture_warn_after: u32,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(kubeconfig: PathBuf) -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            kubeconfig,
            logs_dir: PathBuf::from("logs"),
            marker_path: PathBuf::from("done"),
            poll_interval: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(300),
            query_timeout: Duration::from_secs(20),
            capture_drain_timeout: Duration::from_secs(10),
            soft_failure_budget: 3,
            capture_warn_after: 3,
        }
    }

    /// Default kubeconfig location: `$KUBECONFIG`, else `~/.kube/config`
    ///
    /// Only the first entry of a path list is used.
    pub fn default_kubeconfig() -> PathBuf {
        if let Some(path) = std::env::var_os("KUBECONFIG")
            .and_then(|paths| std::env::split_paths(&paths).next())
            .filter(|p| !p.as_os_str().is_empty())
        {
            return path;
        }

        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        home.join(".kube").join("config")
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kubectl.is_empty() {
            anyhow::bail!("kubectl binary cannot be empty");
        }

        if self.logs_dir.as_os_str().is_empty() {
            anyhow::bail!("logs_dir cannot be empty");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.query_timeout.is_zero() {
            anyhow::bail!("query_timeout must be greater than 0");
        }

        if self.soft_failure_budget == 0 {
            anyhow::bail!("soft_failure_budget must be greater than 0");
        }

        Ok(())
    }

    /// Checks that the access context exists and is readable
    pub fn check_access_context(&self) -> anyhow::Result<()> {
        check_readable(&self.kubeconfig)
    }
}

fn check_readable(path: &Path) -> anyhow::Result<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("access context {} is missing: {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!("access context {} is not a file", path.display());
    }

    std::fs::File::open(path)
        .map_err(|e| anyhow::anyhow!("access context {} is unreadable: {}", path.display(), e))?;

    Ok(())
}
