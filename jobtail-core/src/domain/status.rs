//! Workload status types
//!
//! [`JobStatusReport`] is the scheduler's own view of a Job, decoded from its
//! JSON representation. [`WorkloadStatus`] is the reduced snapshot the
//! supervisor reasons about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Polled snapshot of a workload
///
/// Re-created on every poll, never mutated. The `(active, complete)` pair is
/// interpreted with completion winning ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    pub active: bool,
    pub complete: bool,
    pub observed_at: DateTime<Utc>,
}

impl WorkloadStatus {
    pub fn new(active: bool, complete: bool, observed_at: DateTime<Utc>) -> Self {
        Self {
            active,
            complete,
            observed_at,
        }
    }

    /// Placeholder used when the scheduler could not be reached
    pub fn unknown(observed_at: DateTime<Utc>) -> Self {
        Self::new(false, false, observed_at)
    }

    /// Workload finished, successfully or after exhausting retries
    pub fn finished(&self) -> bool {
        self.complete
    }

    /// Workload has running pods and has not finished
    pub fn running(&self) -> bool {
        self.active && !self.complete
    }

    /// Workload is gone, not yet scheduled, or its state is unknown
    pub fn vanished(&self) -> bool {
        !self.active && !self.complete
    }
}

/// How a finished workload ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded,
    Failed,
    Unknown,
}

/// A Job condition as reported by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCondition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobCondition {
    fn is_true(&self, condition_type: &str) -> bool {
        self.condition_type == condition_type && self.status == "True"
    }
}

/// `.status` of a Job object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    #[serde(default)]
    pub active: u32,
    #[serde(default)]
    pub ready: Option<u32>,
    #[serde(default)]
    pub succeeded: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default)]
    pub conditions: Vec<JobCondition>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct JobObject {
    #[serde(default)]
    status: JobStatusReport,
}

impl JobStatusReport {
    /// Decodes the status from a full Job object (`get job -o json`)
    pub fn from_job_json(json: &str) -> Result<Self, serde_json::Error> {
        let job: JobObject = serde_json::from_str(json)?;
        Ok(job.status)
    }

    /// A `Complete` or `Failed` condition is set
    pub fn is_complete(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.is_true("Complete") || c.is_true("Failed"))
    }

    pub fn is_active(&self) -> bool {
        self.active > 0
    }

    pub fn outcome(&self) -> JobOutcome {
        if self.conditions.iter().any(|c| c.is_true("Complete")) {
            JobOutcome::Succeeded
        } else if self.conditions.iter().any(|c| c.is_true("Failed")) {
            JobOutcome::Failed
        } else {
            JobOutcome::Unknown
        }
    }

    pub fn to_status(&self, observed_at: DateTime<Utc>) -> WorkloadStatus {
        WorkloadStatus::new(self.is_active(), self.is_complete(), observed_at)
    }
}
