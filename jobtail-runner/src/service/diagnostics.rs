//! Diagnostics service
//!
//! Writes describe snapshots of the workload into the run's snapshot logs.
//! Routine snapshots replace the previous one; restart, completion and
//! interruption snapshots accumulate.

use anyhow::Result;
use chrono::Utc;
use jobtail_core::domain::workload::WorkloadHandle;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::artifacts::{ArtifactRole, RunArtifacts};
use crate::repository::WorkloadRepository;

/// Why a snapshot is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Each captured tick
    Routine,
    /// The capture was found dead and is being restarted
    Restart,
    /// The run reached a terminal state
    Completion,
    /// The runner was asked to stop
    Interrupted,
}

impl SnapshotKind {
    pub fn role(&self) -> ArtifactRole {
        match self {
            SnapshotKind::Routine | SnapshotKind::Interrupted => ArtifactRole::Describe,
            SnapshotKind::Restart => ArtifactRole::RestartedDescribe,
            SnapshotKind::Completion => ArtifactRole::CompletionDescribe,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            SnapshotKind::Routine => "status",
            SnapshotKind::Restart => "restart",
            SnapshotKind::Completion => "completion",
            SnapshotKind::Interrupted => "interrupted",
        }
    }

    /// Header line opening every snapshot of this kind
    pub fn header_prefix(&self) -> String {
        format!("===== {} snapshot", self.label())
    }
}

/// Snapshot writer
pub struct DiagnosticsService {
    repository: Arc<dyn WorkloadRepository>,
    artifacts: RunArtifacts,
    query_timeout: Duration,
}

impl DiagnosticsService {
    pub fn new(
        repository: Arc<dyn WorkloadRepository>,
        artifacts: RunArtifacts,
        query_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            artifacts,
            query_timeout,
        }
    }

    /// Records a snapshot
    ///
    /// A failed describe is recorded in place of the description, so a
    /// snapshot is written even when the scheduler is unreachable.
    pub async fn snapshot(&self, handle: &WorkloadHandle, kind: SnapshotKind, note: &str) -> Result<()> {
        let description =
            match tokio::time::timeout(self.query_timeout, self.repository.describe(handle)).await {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!("Describe failed for {} snapshot: {:#}", kind.label(), e);
                    format!("describe unavailable: {:#}", e)
                }
                Err(_) => {
                    warn!("Describe timed out for {} snapshot", kind.label());
                    format!("describe unavailable: timed out after {:?}", self.query_timeout)
                }
            };

        let text = format!(
            "{} at {} ({}) =====\n{}\n\n",
            kind.header_prefix(),
            Utc::now().to_rfc3339(),
            note,
            description.trim_end()
        );

        let role = kind.role();
        match kind {
            SnapshotKind::Routine => self.artifacts.overwrite(&role, &text)?,
            _ => self.artifacts.append(&role, &text)?,
        }

        debug!(
            "Wrote {} snapshot to {}",
            kind.label(),
            self.artifacts.path(&role).display()
        );
        Ok(())
    }
}
