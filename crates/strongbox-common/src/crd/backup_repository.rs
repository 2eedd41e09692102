//! BackupRepository Custom Resource Definition
//!
//! A BackupRepository represents one content-addressable backend repository
//! for the volumes of a single namespace stored in a single
//! BackupStorageLocation. It is created by provisioning workflows with an
//! empty phase and driven through its lifecycle by the repository controller.

use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend implementation behind a repository
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// restic repository accessed through the restic CLI
    #[default]
    Restic,
}

impl std::fmt::Display for RepositoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restic => write!(f, "restic"),
        }
    }
}

/// Lifecycle phase of a BackupRepository
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum BackupRepositoryPhase {
    /// Not yet initialized (an empty phase string is treated the same)
    #[default]
    #[serde(alias = "")]
    New,
    /// Initialized and reachable
    Ready,
    /// Initialization or connectivity failed
    NotReady,
}

impl std::fmt::Display for BackupRepositoryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "New"),
            Self::Ready => write!(f, "Ready"),
            Self::NotReady => write!(f, "NotReady"),
        }
    }
}

/// Specification for a BackupRepository
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "strongbox.dev",
    version = "v1alpha1",
    kind = "BackupRepository",
    plural = "backuprepositories",
    shortname = "repo",
    namespaced,
    status = "BackupRepositoryStatus",
    printcolumn = r#"{"name":"Location","type":"string","jsonPath":".spec.backupStorageLocation"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Last Maintenance","type":"date","jsonPath":".status.lastMaintenanceTime"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BackupRepositorySpec {
    /// Name of the BackupStorageLocation holding this repository
    pub backup_storage_location: String,

    /// Namespace whose volumes are stored in this repository
    pub volume_namespace: String,

    /// Backend implementation
    #[serde(default)]
    pub repository_type: RepositoryType,

    /// Backend identifier (e.g. `s3:s3.amazonaws.com/bucket/restic/ns`).
    /// Empty until resolved by the controller; never cleared afterwards.
    #[serde(default)]
    pub repository_identifier: String,

    /// How often unattended maintenance runs. Unset or zero means the
    /// controller resolves and persists a default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_frequency_seconds: Option<u64>,
}

impl BackupRepositorySpec {
    /// Explicitly configured maintenance frequency, if any
    pub fn maintenance_frequency(&self) -> Option<Duration> {
        self.maintenance_frequency_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Observed state of a BackupRepository
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupRepositoryStatus {
    /// Current phase
    #[serde(default)]
    pub phase: BackupRepositoryPhase,

    /// Latest error, empty when healthy
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// When maintenance last completed successfully
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_maintenance_time: Option<DateTime<Utc>>,
}

impl BackupRepository {
    /// Current phase, `New` when no status has been written yet
    pub fn phase(&self) -> BackupRepositoryPhase {
        self.status.as_ref().map(|s| s.phase).unwrap_or_default()
    }

    /// Current status message (empty when none)
    pub fn message(&self) -> &str {
        self.status.as_ref().map(|s| s.message.as_str()).unwrap_or("")
    }

    /// Time of the last successful maintenance
    pub fn last_maintenance_time(&self) -> Option<DateTime<Utc>> {
        self.status.as_ref().and_then(|s| s.last_maintenance_time)
    }

    /// True once the backend identifier has been resolved
    pub fn has_identifier(&self) -> bool {
        !self.spec.repository_identifier.is_empty()
    }
}

/// A merge-style partial update of a BackupRepository
///
/// Only fields that are `Some` are written. `message: Some(String::new())`
/// clears the message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackupRepositoryPatch {
    /// New `spec.repositoryIdentifier`
    pub repository_identifier: Option<String>,
    /// New `spec.maintenanceFrequencySeconds`
    pub maintenance_frequency_seconds: Option<u64>,
    /// New `status.phase`
    pub phase: Option<BackupRepositoryPhase>,
    /// New `status.message`
    pub message: Option<String>,
    /// New `status.lastMaintenanceTime`
    pub last_maintenance_time: Option<DateTime<Utc>>,
}

impl BackupRepositoryPatch {
    /// Set the repository identifier
    pub fn repository_identifier(mut self, id: impl Into<String>) -> Self {
        self.repository_identifier = Some(id.into());
        self
    }

    /// Set the maintenance frequency
    pub fn maintenance_frequency(mut self, frequency: Duration) -> Self {
        self.maintenance_frequency_seconds = Some(frequency.as_secs());
        self
    }

    /// Set the phase
    pub fn phase(mut self, phase: BackupRepositoryPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Set the status message
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Set the last maintenance time
    pub fn last_maintenance_time(mut self, at: DateTime<Utc>) -> Self {
        self.last_maintenance_time = Some(at);
        self
    }

    /// True when the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.spec_patch().is_none() && self.status_patch().is_none()
    }

    /// JSON merge patch for the main resource, if any spec field changes
    pub fn spec_patch(&self) -> Option<Value> {
        let mut spec = Map::new();
        if let Some(ref id) = self.repository_identifier {
            spec.insert("repositoryIdentifier".into(), Value::from(id.clone()));
        }
        if let Some(secs) = self.maintenance_frequency_seconds {
            spec.insert("maintenanceFrequencySeconds".into(), Value::from(secs));
        }
        (!spec.is_empty()).then(|| serde_json::json!({ "spec": spec }))
    }

    /// JSON merge patch for the status sub-resource, if any status field changes
    pub fn status_patch(&self) -> Option<Value> {
        let mut status = Map::new();
        if let Some(phase) = self.phase {
            status.insert("phase".into(), Value::from(phase.to_string()));
        }
        if let Some(ref msg) = self.message {
            status.insert("message".into(), Value::from(msg.clone()));
        }
        if let Some(at) = self.last_maintenance_time {
            status.insert(
                "lastMaintenanceTime".into(),
                Value::from(at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            );
        }
        (!status.is_empty()).then(|| serde_json::json!({ "status": status }))
    }

    /// Apply the patch to an in-memory copy
    pub fn apply_to(&self, repo: &mut BackupRepository) {
        if let Some(ref id) = self.repository_identifier {
            repo.spec.repository_identifier = id.clone();
        }
        if let Some(secs) = self.maintenance_frequency_seconds {
            repo.spec.maintenance_frequency_seconds = Some(secs);
        }
        if self.phase.is_none() && self.message.is_none() && self.last_maintenance_time.is_none() {
            return;
        }
        let status = repo.status.get_or_insert_with(Default::default);
        if let Some(phase) = self.phase {
            status.phase = phase;
        }
        if let Some(ref msg) = self.message {
            status.message = msg.clone();
        }
        if let Some(at) = self.last_maintenance_time {
            status.last_maintenance_time = Some(at);
        }
    }
}
