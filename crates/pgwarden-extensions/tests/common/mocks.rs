//! Test doubles for the transport, filesystem, and status persistence

use async_trait::async_trait;
use pgwarden_core::types::{Cluster, InstalledExtension};
use pgwarden_core::{Error, Result};
use pgwarden_extensions::{layout, FileSystem, NativeFileSystem, StatusWriter, WebClient};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use url::Url;

use super::fixtures::{checksum_for, REPOSITORY};

/// [`WebClient`] serving canned responses and counting requests
#[derive(Default)]
pub struct StaticWebClient {
    responses: Mutex<HashMap<Url, Vec<u8>>>,
    hits: Mutex<HashMap<Url, usize>>,
}

impl StaticWebClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, uri: Url, body: Vec<u8>) {
        self.responses.lock().unwrap().insert(uri, body);
    }

    /// How many times `uri` was requested
    pub fn hits(&self, uri: &Url) -> usize {
        self.hits.lock().unwrap().get(uri).copied().unwrap_or(0)
    }
}

#[async_trait]
impl WebClient for StaticWebClient {
    async fn get_bytes(&self, uri: &Url) -> Result<Vec<u8>> {
        *self.hits.lock().unwrap().entry(uri.clone()).or_insert(0) += 1;
        self.responses
            .lock()
            .unwrap()
            .get(uri)
            .cloned()
            .ok_or_else(|| Error::repository(uri.as_str(), "HTTP 404 Not Found"))
    }
}

/// Seed a web client with an index document and fully-signed packages
pub fn seed_repository(
    web: &StaticWebClient,
    index: Vec<u8>,
    packages: &[(InstalledExtension, Vec<u8>)],
) {
    let repository = Url::parse(REPOSITORY).unwrap();
    web.insert(layout::index_uri(&repository).unwrap(), index);
    for (record, package) in packages {
        web.insert(
            layout::package_uri(&repository, record).unwrap(),
            package.clone(),
        );
        web.insert(
            layout::checksum_uri(&repository, record).unwrap(),
            checksum_for(package),
        );
    }
}

/// Real filesystem that records every mutation it performs
///
/// The mutation log makes idempotence observable: a repeated pass over an
/// already-converged tree must add no entries.
#[derive(Default)]
pub struct RecordingFileSystem {
    inner: NativeFileSystem,
    mutations: Mutex<Vec<String>>,
}

impl RecordingFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.mutations.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.mutations.lock().unwrap().clear();
    }

    fn record(&self, operation: &str, path: &Path) {
        self.mutations
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, path.display()));
    }
}

impl FileSystem for RecordingFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn create_directories(&self, path: &Path) -> Result<()> {
        self.record("create_directories", path);
        self.inner.create_directories(path)
    }

    fn copy_or_replace(&self, content: &[u8], target: &Path) -> Result<()> {
        self.record("copy_or_replace", target);
        self.inner.copy_or_replace(content, target)
    }

    fn create_or_replace_file(&self, path: &Path) -> Result<()> {
        self.record("create_or_replace_file", path);
        self.inner.create_or_replace_file(path)
    }

    fn create_or_replace_symlink(&self, link: &Path, target: &Path) -> Result<()> {
        self.record("create_or_replace_symlink", link);
        self.inner.create_or_replace_symlink(link, target)
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        self.record("set_permissions", path);
        self.inner.set_permissions(path, mode)
    }

    fn delete_if_exists(&self, path: &Path) -> Result<()> {
        self.record("delete_if_exists", path);
        self.inner.delete_if_exists(path)
    }

    fn list(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.list(path)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.inner.read(path)
    }
}

/// [`StatusWriter`] capturing every persisted cluster
#[derive(Default)]
pub struct RecordingStatusWriter {
    clusters: Mutex<Vec<Cluster>>,
}

impl RecordingStatusWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn persisted(&self) -> Vec<Cluster> {
        self.clusters.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusWriter for RecordingStatusWriter {
    async fn update_status(&self, cluster: &Cluster) -> Result<()> {
        self.clusters.lock().unwrap().push(cluster.clone());
        Ok(())
    }
}

/// [`StatusWriter`] that always loses the optimistic-concurrency race
pub struct ConflictStatusWriter;

#[async_trait]
impl StatusWriter for ConflictStatusWriter {
    async fn update_status(&self, cluster: &Cluster) -> Result<()> {
        Err(Error::status_conflict(
            cluster.resource_version.clone().unwrap_or_default(),
        ))
    }
}
