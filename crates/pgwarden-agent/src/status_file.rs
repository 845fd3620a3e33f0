//! File-backed cluster status persistence
//!
//! Persists the reconciled cluster back to the resource file the agent was
//! given. The write is compare-and-swap on `resourceVersion`: the stored
//! version must still match the one the pass started from, otherwise a
//! concurrent writer won and the pass fails with a status conflict. On
//! success the version is bumped so the next writer sees the change.

use async_trait::async_trait;
use pgwarden_core::types::Cluster;
use pgwarden_core::{Error, Result};
use pgwarden_extensions::StatusWriter;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct FileStatusWriter {
    path: PathBuf,
}

impl FileStatusWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn parse(&self, raw: &str) -> Result<Cluster> {
        serde_yaml_ng::from_str(raw)
            .map_err(|error| Error::Filesystem(std::io::Error::new(ErrorKind::InvalidData, error)))
    }
}

#[async_trait]
impl StatusWriter for FileStatusWriter {
    async fn update_status(&self, cluster: &Cluster) -> Result<()> {
        let raw = std::fs::read_to_string(&self.path)?;
        let stored = self.parse(&raw)?;
        if stored.resource_version != cluster.resource_version {
            return Err(Error::status_conflict(
                cluster.resource_version.clone().unwrap_or_default(),
            ));
        }

        let mut persisted = cluster.clone();
        if let Some(next) = stored
            .resource_version
            .as_deref()
            .and_then(|version| version.parse::<u64>().ok())
        {
            persisted.resource_version = Some((next + 1).to_string());
        }

        let rendered = serde_yaml_ng::to_string(&persisted)
            .map_err(|error| Error::Filesystem(std::io::Error::new(ErrorKind::InvalidData, error)))?;

        // Stage next to the target so the rename stays on one filesystem
        let name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("cluster");
        let staging = self.path.with_file_name(format!(".{name}.tmp"));
        std::fs::write(&staging, rendered)?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }
}
