//! Cluster custom resource types
//!
//! Mirrors the slice of the cluster custom resource the extension
//! reconciler reads and writes: the desired extension list in the spec and
//! the per-pod installed-extension records in the status. All other status
//! fields belong to external collaborators and are carried opaquely.

use serde::{Deserialize, Serialize};

/// A PostgreSQL cluster custom resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Cluster name
    pub name: String,

    /// Version token for optimistic-concurrency status updates
    #[serde(default)]
    pub resource_version: Option<String>,

    /// Desired state
    pub spec: ClusterSpec,

    /// Observed state; created lazily on first reconciliation
    #[serde(default)]
    pub status: Option<ClusterStatus>,
}

/// Cluster desired state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Full PostgreSQL version (e.g., "12.4")
    pub postgres_version: String,

    /// Extensions the cluster's pods should have
    #[serde(default)]
    pub postgres_extensions: Vec<ExtensionSpec>,
}

/// A requested extension from the cluster spec
///
/// Version and channel are mutually exclusive; when both are absent the
/// resolver falls back to the repository's default channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSpec {
    /// Extension name (e.g., "timescaledb")
    pub name: String,

    /// Publisher identifier (e.g., "com.ongres")
    pub publisher: String,

    /// Repository URI; falls back to the configured default repository
    #[serde(default)]
    pub repository: Option<String>,

    /// Explicit version to install
    #[serde(default)]
    pub version: Option<String>,

    /// Channel alias mapping to a version (e.g., "stable")
    #[serde(default)]
    pub channel: Option<String>,
}

/// Cluster observed state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Per-pod extension state
    #[serde(default)]
    pub pod_statuses: Vec<PodStatus>,
}

/// Per-pod record of installed extensions and restart bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    /// Pod name
    pub name: String,

    /// Extensions currently recorded as installed on the pod
    #[serde(default)]
    pub installed_postgres_extensions: Vec<InstalledExtension>,

    /// True while at least one extension change is deferred until the
    /// pod's database process restarts
    #[serde(default)]
    pub pending_restart: Option<bool>,
}

impl PodStatus {
    /// Create an empty status for a pod
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            installed_postgres_extensions: Vec::new(),
            pending_restart: None,
        }
    }

    /// Whether the pod is flagged for a pending restart
    pub fn is_pending_restart(&self) -> bool {
        self.pending_restart.unwrap_or(false)
    }
}

/// A fully-resolved extension record persisted in the cluster status
///
/// Full equality (`PartialEq`) compares every field; [`same`] compares only
/// the identity tuple `{name, publisher, repository}` so that two versions
/// of one extension are recognized as the same extension.
///
/// [`same`]: InstalledExtension::same
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledExtension {
    /// Extension name
    pub name: String,

    /// Publisher identifier
    pub publisher: String,

    /// Repository URI the package was resolved from
    pub repository: String,

    /// Installed version
    pub version: String,

    /// PostgreSQL major version the package targets (e.g., "12")
    pub postgres_version: String,

    /// Build major version the package targets; absent for any-build packages
    #[serde(default)]
    pub build: Option<String>,
}

impl InstalledExtension {
    /// Whether `other` is the same extension regardless of version
    pub fn same(&self, other: &InstalledExtension) -> bool {
        self.name == other.name
            && self.publisher == other.publisher
            && self.repository == other.repository
    }

    /// Human-readable description used in logs and error messages
    pub fn description(&self) -> String {
        match &self.build {
            Some(build) => format!(
                "{}/{} {} (postgres {}, build {})",
                self.publisher, self.name, self.version, self.postgres_version, build
            ),
            None => format!(
                "{}/{} {} (postgres {})",
                self.publisher, self.name, self.version, self.postgres_version
            ),
        }
    }
}
