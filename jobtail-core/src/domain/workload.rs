//! Workload identity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::descriptor::WorkloadDescriptor;

/// Identifies a submitted workload
///
/// Created once after submission and used as the key for every
/// subsequent scheduler query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadHandle {
    pub name: String,
    pub namespace: String,
    pub submitted_at: DateTime<Utc>,
}

impl WorkloadHandle {
    pub fn new(descriptor: &WorkloadDescriptor, submitted_at: DateTime<Utc>) -> Self {
        Self {
            name: descriptor.name.clone(),
            namespace: descriptor.namespace.clone(),
            submitted_at,
        }
    }

    /// Label selector matching the pods the Job controller creates
    pub fn pod_selector(&self) -> String {
        format!("job-name={}", self.name)
    }
}

/// Which containers a capture process should follow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSelector {
    /// Pod label selector
    pub labels: String,
    /// Only stream output produced after this instant
    pub since: Option<DateTime<Utc>>,
}

impl ContainerSelector {
    /// Selects every container of every pod belonging to the workload
    pub fn for_workload(handle: &WorkloadHandle) -> Self {
        Self {
            labels: handle.pod_selector(),
            since: None,
        }
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}
