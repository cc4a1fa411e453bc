//! Workload descriptor parsing and validation
//!
//! A descriptor is a (possibly multi-document) YAML manifest. Exactly one
//! document must be a `Job`; that document supplies the workload name,
//! namespace and container names. The whole text is kept so it can be
//! submitted to the scheduler unchanged.

use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::error::ValidationError;

/// Kind of workload declared by a manifest document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadKind {
    Job,
    Other(String),
}

impl WorkloadKind {
    fn from_kind(kind: &str) -> Self {
        match kind {
            "Job" => WorkloadKind::Job,
            other => WorkloadKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::Job => write!(f, "Job"),
            WorkloadKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

/// Validated workload descriptor
///
/// Only constructed through [`WorkloadDescriptor::parse`], so every instance
/// has kind `Job`, a non-empty namespace and name, and at least one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadDescriptor {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
    /// First container declared in the pod template
    pub primary_container: String,
    pub containers: Vec<String>,
    /// Raw descriptor text, submitted as-is
    pub source: String,
}

// Partial view of a Job manifest. Everything is optional so that missing
// fields surface as validation errors instead of serde errors.

#[derive(Debug, Default, Deserialize)]
struct JobManifest {
    #[serde(default)]
    metadata: ManifestMetadata,
    #[serde(default)]
    spec: JobSpec,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestMetadata {
    name: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct JobSpec {
    #[serde(default)]
    template: PodTemplate,
}

#[derive(Debug, Default, Deserialize)]
struct PodTemplate {
    #[serde(default)]
    spec: PodSpec,
}

#[derive(Debug, Default, Deserialize)]
struct PodSpec {
    #[serde(default)]
    containers: Vec<ContainerSpec>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerSpec {
    name: Option<String>,
}

impl WorkloadDescriptor {
    /// Reads and validates a descriptor file
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let source = std::fs::read_to_string(path).map_err(|e| ValidationError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&source)
    }

    /// Parses and validates descriptor text
    ///
    /// Checks, in order:
    /// 1. exactly one document has `kind: Job`
    /// 2. that document declares a non-empty `metadata.namespace`
    /// 3. it declares a non-empty `metadata.name` and at least one named
    ///    container under `spec.template.spec.containers`
    pub fn parse(source: &str) -> Result<Self, ValidationError> {
        let mut jobs = Vec::new();

        for document in serde_yaml::Deserializer::from_str(source) {
            let value = serde_yaml::Value::deserialize(document)
                .map_err(|e| ValidationError::Parse(e.to_string()))?;

            // Empty documents (e.g. a trailing `---`) carry nothing
            if value.is_null() {
                continue;
            }

            let kind = value
                .get("kind")
                .and_then(serde_yaml::Value::as_str)
                .map(WorkloadKind::from_kind);

            if kind == Some(WorkloadKind::Job) {
                jobs.push(value);
            }
        }

        let job = match jobs.len() {
            0 => return Err(ValidationError::NoJob),
            1 => jobs.remove(0),
            n => return Err(ValidationError::MultipleJobs(n)),
        };

        let manifest: JobManifest =
            serde_yaml::from_value(job).map_err(|e| ValidationError::Parse(e.to_string()))?;

        let namespace = non_empty(manifest.metadata.namespace).ok_or(ValidationError::MissingNamespace)?;
        let name = non_empty(manifest.metadata.name).ok_or(ValidationError::MissingName)?;

        let container_specs = manifest.spec.template.spec.containers;
        if container_specs.is_empty() {
            return Err(ValidationError::NoContainers);
        }

        let mut containers = Vec::with_capacity(container_specs.len());
        for (index, container) in container_specs.into_iter().enumerate() {
            let container_name =
                non_empty(container.name).ok_or(ValidationError::UnnamedContainer(index))?;
            containers.push(container_name);
        }

        Ok(Self {
            kind: WorkloadKind::Job,
            name,
            namespace,
            primary_container: containers[0].clone(),
            containers,
            source: source.to_string(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
