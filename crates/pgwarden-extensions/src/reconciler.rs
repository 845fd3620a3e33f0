//! Per-pod extension reconciliation
//!
//! One pass brings a single pod's filesystem in line with the cluster's
//! desired extension list and records the outcome in the pod's status.
//! Each extension is handled independently: a failure is captured, the
//! failure hook fires, and the pass moves on to the next extension, so one
//! broken package never blocks the rest. The pass itself is idempotent and
//! is expected to run repeatedly on a schedule.
//!
//! With `skip_shared_library_overwrites` set (the mode used while the
//! database process is running) the pass never replaces a shared library
//! that is already on disk. Such installs are parked behind a `.pending`
//! marker and the pod is flagged for a restart; the post-restart pass runs
//! without the flag and completes them.

use pgwarden_core::types::{Cluster, ClusterStatus, InstalledExtension, PodStatus};
use pgwarden_core::{Error, Result};
use tracing::{info, warn};

use crate::manager::ExtensionManager;
use crate::status::StatusWriter;

/// Outcome of one reconciliation pass
#[derive(Debug, Default)]
pub struct ReconciliationResult {
    /// Whether the pass mutated the cluster status
    pub updated: bool,

    /// Per-extension failures; the rest of the pass still ran
    pub errors: Vec<Error>,
}

impl ReconciliationResult {
    /// Whether every extension reconciled without error
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Callbacks fired when a single extension fails to reconcile
///
/// The defaults log through `tracing`; an embedding control plane can
/// override them to emit events against the cluster resource instead.
pub trait ReconciliationHooks: Send + Sync {
    fn on_uninstall_error(&self, pod_name: &str, extension: &InstalledExtension, error: &Error) {
        warn!(
            "Failed removing extension {} from pod {}: {}",
            extension.description(),
            pod_name,
            error
        );
    }

    fn on_install_error(&self, pod_name: &str, extension: &InstalledExtension, error: &Error) {
        warn!(
            "Failed installing extension {} on pod {}: {}",
            extension.description(),
            pod_name,
            error
        );
    }
}

/// Hooks that only log
pub struct LoggingHooks;

impl ReconciliationHooks for LoggingHooks {}

/// Reconciles one pod's extensions against the cluster's desired list
pub struct ExtensionReconciler {
    pod_name: String,
    manager: ExtensionManager,
    skip_shared_library_overwrites: bool,
    hooks: Box<dyn ReconciliationHooks>,
}

impl ExtensionReconciler {
    pub fn new(
        pod_name: impl Into<String>,
        manager: ExtensionManager,
        skip_shared_library_overwrites: bool,
    ) -> Self {
        Self {
            pod_name: pod_name.into(),
            manager,
            skip_shared_library_overwrites,
            hooks: Box::new(LoggingHooks),
        }
    }

    /// Replace the failure hooks
    pub fn with_hooks(mut self, hooks: Box<dyn ReconciliationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn manager(&self) -> &ExtensionManager {
        &self.manager
    }

    /// Resolve the cluster's desired extension list for this pod
    ///
    /// A spec that fails to resolve falls back to the pod's recorded
    /// version of the same extension, keeping it in the desired list: the
    /// install phase then reports the resolution failure on every pass
    /// while the removal phase leaves the installed files alone. A
    /// repository outage therefore never reads as "nothing is desired".
    /// Specs with neither a resolution nor a prior record are returned as
    /// errors.
    pub async fn resolve_desired(
        &self,
        cluster: &Cluster,
    ) -> (Vec<InstalledExtension>, Vec<Error>) {
        let recorded = cluster
            .status
            .as_ref()
            .and_then(|status| {
                status
                    .pod_statuses
                    .iter()
                    .find(|pod| pod.name == self.pod_name)
            })
            .map(|pod| pod.installed_postgres_extensions.clone())
            .unwrap_or_default();

        let mut desired = Vec::new();
        let mut errors = Vec::new();
        for spec in &cluster.spec.postgres_extensions {
            match self.manager.resolver().resolve(spec).await {
                Ok(metadata) => desired.push(metadata.to_installed(self.manager.config())),
                Err(error) => {
                    let retained = recorded
                        .iter()
                        .find(|record| record.name == spec.name && record.publisher == spec.publisher);
                    match retained {
                        Some(record) => {
                            warn!(
                                "Cannot resolve extension {}/{}; keeping installed version {}: {}",
                                spec.publisher, spec.name, record.version, error
                            );
                            desired.push(record.clone());
                        }
                        None => errors.push(error),
                    }
                }
            }
        }
        (desired, errors)
    }

    /// Run one pass against `cluster`, mutating its status in place
    ///
    /// `to_install` is the fully-resolved desired list for this pod.
    /// Extensions recorded as installed but no longer desired are removed
    /// first, then each desired extension is brought to its target state.
    /// The returned result says whether the status changed and carries
    /// every per-extension failure.
    pub async fn reconcile(
        &self,
        cluster: &mut Cluster,
        to_install: &[InstalledExtension],
    ) -> ReconciliationResult {
        let mut updated = false;
        let mut errors = Vec::new();

        let status = cluster.status.get_or_insert_with(ClusterStatus::default);
        let pod_index = match status
            .pod_statuses
            .iter()
            .position(|pod| pod.name == self.pod_name)
        {
            Some(index) => index,
            None => {
                status.pod_statuses.push(PodStatus::new(&self.pod_name));
                status.pod_statuses.len() - 1
            }
        };
        let pod_status = &mut status.pod_statuses[pod_index];

        let current = pod_status.installed_postgres_extensions.clone();
        for installed in &current {
            if to_install.iter().any(|candidate| candidate.same(installed)) {
                continue;
            }
            if self.skip_shared_library_overwrites {
                // Removal may unmap a library the running backend still
                // uses, so it waits for the restart pass
                if !pod_status.is_pending_restart() {
                    pod_status.pending_restart = Some(true);
                    updated = true;
                }
                continue;
            }
            match self.remove(installed) {
                Ok(()) => {
                    pod_status
                        .installed_postgres_extensions
                        .retain(|record| record != installed);
                    updated = true;
                }
                Err(error) => {
                    self.hooks
                        .on_uninstall_error(&self.pod_name, installed, &error);
                    errors.push(error);
                }
            }
        }

        for extension in to_install {
            match self.install(extension).await {
                Ok(deferred) => {
                    if deferred && !pod_status.is_pending_restart() {
                        pod_status.pending_restart = Some(true);
                        updated = true;
                    }
                    // The record is updated even when the install itself
                    // is deferred; the filesystem catches up after restart
                    if !pod_status
                        .installed_postgres_extensions
                        .iter()
                        .any(|record| record == extension)
                    {
                        let previous = pod_status
                            .installed_postgres_extensions
                            .iter()
                            .find(|record| record.same(extension))
                            .cloned();
                        if let Some(previous) = previous {
                            info!(
                                "Replacing extension {} with version {}",
                                previous.description(),
                                extension.version
                            );
                            pod_status
                                .installed_postgres_extensions
                                .retain(|record| *record != previous);
                        }
                        info!("Recorded extension {}", extension.description());
                        pod_status.installed_postgres_extensions.push(extension.clone());
                        updated = true;
                    }
                }
                Err(error) => {
                    self.hooks
                        .on_install_error(&self.pod_name, extension, &error);
                    errors.push(error);
                }
            }
        }

        // A restart pass that got this far has applied everything that was
        // deferred, so the flag comes off
        if !self.skip_shared_library_overwrites && pod_status.is_pending_restart() {
            pod_status.pending_restart = Some(false);
            updated = true;
        }

        ReconciliationResult { updated, errors }
    }

    /// Run one pass and persist the status when it changed
    ///
    /// A [`StatusWriter`] conflict fails the whole pass; the caller retries
    /// on the next cycle against a fresh cluster read.
    pub async fn reconcile_and_persist(
        &self,
        cluster: &mut Cluster,
        to_install: &[InstalledExtension],
        writer: &dyn StatusWriter,
    ) -> Result<ReconciliationResult> {
        let result = self.reconcile(cluster, to_install).await;
        if result.updated {
            writer.update_status(cluster).await?;
        }
        Ok(result)
    }

    fn remove(&self, extension: &InstalledExtension) -> Result<()> {
        let uninstaller = self.manager.extension_uninstaller(extension);
        if uninstaller.is_extension_installed() {
            info!("Removing extension {}", extension.description());
            uninstaller.uninstall_extension()?;
        }
        Ok(())
    }

    /// Bring one desired extension to its target state
    ///
    /// Returns whether completion was deferred behind a pending restart.
    async fn install(&self, extension: &InstalledExtension) -> Result<bool> {
        let installer = self.manager.extension_installer(extension).await?;
        if !installer.is_extension_installed()
            && (!self.skip_shared_library_overwrites
                || !installer.is_extension_pending_overwrite())
        {
            info!("Downloading extension {}", extension.description());
            installer.download_and_extract().await?;
            installer.verify()?;
            if self.skip_shared_library_overwrites
                && installer.does_install_overwrite_any_shared_library()?
            {
                if !installer.is_extension_pending_overwrite() {
                    installer.set_extension_as_pending()?;
                }
                return Ok(true);
            }
            info!("Installing extension {}", extension.description());
            installer.install_extension()?;
        } else if !installer.is_links_created() {
            installer.create_extension_links()?;
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use crate::web::MockWebClient;
    use pgwarden_core::types::ClusterSpec;
    use pgwarden_core::ExtensionsConfig;
    use std::path::PathBuf;
    use std::sync::Arc;
    use url::Url;

    fn config() -> ExtensionsConfig {
        ExtensionsConfig {
            repository: Url::parse("https://extensions.example.com/postgres/repository").unwrap(),
            default_channel: "stable".to_string(),
            extensions_path: PathBuf::from("/var/lib/postgresql/extensions"),
            postgres_version: "12.4".to_string(),
            build_version: "6.0.2".to_string(),
        }
    }

    fn cluster_with(records: Vec<InstalledExtension>) -> Cluster {
        Cluster {
            name: "cluster".to_string(),
            resource_version: Some("1".to_string()),
            spec: ClusterSpec {
                postgres_version: "12.4".to_string(),
                postgres_extensions: Vec::new(),
            },
            status: Some(ClusterStatus {
                pod_statuses: vec![PodStatus {
                    name: "cluster-0".to_string(),
                    installed_postgres_extensions: records,
                    pending_restart: None,
                }],
            }),
        }
    }

    fn record() -> InstalledExtension {
        InstalledExtension {
            name: "timescaledb".to_string(),
            publisher: "com.ongres".to_string(),
            repository: "https://extensions.example.com/postgres/repository".to_string(),
            version: "1.7.1".to_string(),
            postgres_version: "12".to_string(),
            build: Some("6.0".to_string()),
        }
    }

    fn reconciler(fs: MockFileSystem, skip: bool) -> ExtensionReconciler {
        let web = MockWebClient::new();
        let manager = ExtensionManager::new(Arc::new(fs), Arc::new(web), config());
        ExtensionReconciler::new("cluster-0", manager, skip)
    }

    #[tokio::test]
    async fn undesired_record_without_marker_is_dropped_without_touching_disk() {
        let mut fs = MockFileSystem::new();
        fs.expect_exists().return_const(false);
        let reconciler = reconciler(fs, false);

        let mut cluster = cluster_with(vec![record()]);
        let result = reconciler.reconcile(&mut cluster, &[]).await;

        assert!(result.updated);
        assert!(result.is_clean());
        let pod = &cluster.status.unwrap().pod_statuses[0];
        assert!(pod.installed_postgres_extensions.is_empty());
        assert!(!pod.is_pending_restart());
    }

    #[tokio::test]
    async fn skip_mode_defers_removal_behind_pending_restart() {
        let reconciler = reconciler(MockFileSystem::new(), true);

        let mut cluster = cluster_with(vec![record()]);
        let result = reconciler.reconcile(&mut cluster, &[]).await;

        assert!(result.updated);
        assert!(result.is_clean());
        let pod = &cluster.status.unwrap().pod_statuses[0];
        assert_eq!(pod.installed_postgres_extensions, vec![record()]);
        assert!(pod.is_pending_restart());
    }

    #[tokio::test]
    async fn unresolvable_spec_falls_back_to_the_recorded_version() {
        let mut web = MockWebClient::new();
        web.expect_get_bytes()
            .returning(|uri| Err(Error::repository(uri.as_str(), "connection refused")));
        let manager =
            ExtensionManager::new(Arc::new(MockFileSystem::new()), Arc::new(web), config());
        let reconciler = ExtensionReconciler::new("cluster-0", manager, false);

        let mut cluster = cluster_with(vec![record()]);
        cluster.spec.postgres_extensions = vec![pgwarden_core::types::ExtensionSpec {
            name: "timescaledb".to_string(),
            publisher: "com.ongres".to_string(),
            repository: None,
            version: None,
            channel: None,
        }];

        let (desired, errors) = reconciler.resolve_desired(&cluster).await;
        assert_eq!(desired, vec![record()]);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_spec_without_a_record_is_an_error() {
        let mut web = MockWebClient::new();
        web.expect_get_bytes()
            .returning(|uri| Err(Error::repository(uri.as_str(), "connection refused")));
        let manager =
            ExtensionManager::new(Arc::new(MockFileSystem::new()), Arc::new(web), config());
        let reconciler = ExtensionReconciler::new("cluster-0", manager, false);

        let mut cluster = cluster_with(Vec::new());
        cluster.spec.postgres_extensions = vec![pgwarden_core::types::ExtensionSpec {
            name: "postgis".to_string(),
            publisher: "com.ongres".to_string(),
            repository: None,
            version: None,
            channel: None,
        }];

        let (desired, errors) = reconciler.resolve_desired(&cluster).await;
        assert!(desired.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::Repository { .. }));
    }

    #[tokio::test]
    async fn missing_pod_status_is_created_lazily() {
        let reconciler = reconciler(MockFileSystem::new(), false);

        let mut cluster = cluster_with(Vec::new());
        cluster.status = None;
        let result = reconciler.reconcile(&mut cluster, &[]).await;

        assert!(!result.updated);
        let status = cluster.status.unwrap();
        assert_eq!(status.pod_statuses.len(), 1);
        assert_eq!(status.pod_statuses[0].name, "cluster-0");
    }
}
