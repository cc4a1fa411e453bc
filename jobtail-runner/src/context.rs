//! Run context
//!
//! Everything a supervised run needs that does not change while it runs:
//! - Run identifier for correlating log lines
//! - Validated workload descriptor
//! - Runner configuration
//! - Artifact locations

use chrono::Local;
use jobtail_core::domain::descriptor::WorkloadDescriptor;
use uuid::Uuid;

use crate::artifacts::{ArtifactRole, RunArtifacts};
use crate::config::Config;

/// Immutable state shared by the supervisor and its collaborators
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub descriptor: WorkloadDescriptor,
    pub config: Config,
    pub artifacts: RunArtifacts,
}

impl RunContext {
    /// Creates a new run context, fixing the artifact timestamp to now
    pub fn new(descriptor: WorkloadDescriptor, config: Config) -> Self {
        let artifacts = RunArtifacts::new(
            config.logs_dir.clone(),
            config.marker_path.clone(),
            descriptor.name.clone(),
            Local::now(),
        );

        Self {
            run_id: Uuid::new_v4(),
            descriptor,
            config,
            artifacts,
        }
    }

    /// Artifact role of the container output log
    pub fn container_role(&self) -> ArtifactRole {
        ArtifactRole::Container(self.descriptor.primary_container.clone())
    }
}
