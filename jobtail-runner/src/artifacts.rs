//! Run artifacts
//!
//! Every file a run produces is named `{job}-{role}-{timestamp}.log` under the
//! logs directory, with one timestamp fixed for the whole run. The `done`
//! marker lives outside the logs directory and signals that supervision has
//! concluded.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind of file within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRole {
    /// Control-loop narrative
    Runner,
    /// Combined container output, named after the primary container
    Container(String),
    /// Routine status snapshot
    Describe,
    /// Snapshot taken whenever the capture is restarted
    RestartedDescribe,
    /// Snapshot taken at the terminal state
    CompletionDescribe,
}

impl ArtifactRole {
    fn label(&self) -> &str {
        match self {
            ArtifactRole::Runner => "runner",
            ArtifactRole::Container(name) => name,
            ArtifactRole::Describe => "describe",
            ArtifactRole::RestartedDescribe => "restarted-describe",
            ArtifactRole::CompletionDescribe => "completion-describe",
        }
    }
}

/// Locations of everything a single run writes
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    logs_dir: PathBuf,
    marker_path: PathBuf,
    job_name: String,
    timestamp: String,
}

impl RunArtifacts {
    pub fn new(
        logs_dir: impl Into<PathBuf>,
        marker_path: impl Into<PathBuf>,
        job_name: impl Into<String>,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            logs_dir: logs_dir.into(),
            marker_path: marker_path.into(),
            job_name: job_name.into(),
            timestamp: started_at.format("%Y%m%d-%H%M%S").to_string(),
        }
    }

    pub fn path(&self, role: &ArtifactRole) -> PathBuf {
        self.logs_dir.join(format!(
            "{}-{}-{}.log",
            self.job_name,
            role.label(),
            self.timestamp
        ))
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    /// Creates the logs directory
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("Failed to create {}", self.logs_dir.display()))
    }

    /// Opens an artifact for appending, creating it if needed
    pub fn open_append(&self, role: &ArtifactRole) -> Result<std::fs::File> {
        let path = self.path(role);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))
    }

    pub fn append(&self, role: &ArtifactRole, text: &str) -> Result<()> {
        let mut file = self.open_append(role)?;
        file.write_all(text.as_bytes())
            .with_context(|| format!("Failed to append to {}", self.path(role).display()))
    }

    /// Replaces an artifact's content
    pub fn overwrite(&self, role: &ArtifactRole, text: &str) -> Result<()> {
        let path = self.path(role);
        std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Removes a marker left behind by a previous run
    pub fn clear_marker(&self) -> Result<()> {
        match std::fs::remove_file(&self.marker_path) {
            Ok(()) => {
                debug!("Removed stale marker {}", self.marker_path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove {}", self.marker_path.display())),
        }
    }

    /// Creates the zero-byte terminal marker
    pub fn mark_done(&self) -> Result<()> {
        std::fs::File::create(&self.marker_path)
            .map(|_| ())
            .with_context(|| format!("Failed to create {}", self.marker_path.display()))
    }

    pub fn is_done(&self) -> bool {
        self.marker_path.exists()
    }
}
