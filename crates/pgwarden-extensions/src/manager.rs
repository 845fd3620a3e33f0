//! Extension manager
//!
//! Wires the filesystem, the repository transport, and the metadata
//! resolver together and hands out per-extension installers and
//! uninstallers sharing that plumbing.

use pgwarden_core::types::InstalledExtension;
use pgwarden_core::{ExtensionsConfig, Result};
use std::sync::Arc;

use crate::fs::FileSystem;
use crate::installer::ExtensionInstaller;
use crate::layout::ExtensionLayout;
use crate::resolver::MetadataResolver;
use crate::uninstaller::ExtensionUninstaller;
use crate::web::WebClient;

/// Factory for extension installers and uninstallers on one pod
pub struct ExtensionManager {
    fs: Arc<dyn FileSystem>,
    web: Arc<dyn WebClient>,
    resolver: MetadataResolver,
}

impl ExtensionManager {
    pub fn new(fs: Arc<dyn FileSystem>, web: Arc<dyn WebClient>, config: ExtensionsConfig) -> Self {
        let resolver = MetadataResolver::new(Arc::clone(&web), config);
        Self { fs, web, resolver }
    }

    pub fn config(&self) -> &ExtensionsConfig {
        self.resolver.config()
    }

    pub fn resolver(&self) -> &MetadataResolver {
        &self.resolver
    }

    /// Build an installer for a resolved extension record
    ///
    /// Resolves the record against the repository index to obtain the
    /// publisher key; fails with `NotFound` when the index no longer
    /// carries the requested artifact.
    pub async fn extension_installer(
        &self,
        extension: &InstalledExtension,
    ) -> Result<ExtensionInstaller> {
        let metadata = self.resolver.resolve_installed(extension).await?;
        Ok(ExtensionInstaller::new(
            Arc::clone(&self.fs),
            Arc::clone(&self.web),
            ExtensionLayout::new(self.config()),
            extension.clone(),
            metadata.publisher,
            metadata.repository,
        ))
    }

    /// Build an uninstaller for an installed extension record
    ///
    /// Uninstallation works entirely from the local cache, so no index
    /// lookup is needed and construction cannot fail on network state.
    pub fn extension_uninstaller(&self, extension: &InstalledExtension) -> ExtensionUninstaller {
        ExtensionUninstaller::new(
            Arc::clone(&self.fs),
            ExtensionLayout::new(self.config()),
            extension.clone(),
        )
    }
}
