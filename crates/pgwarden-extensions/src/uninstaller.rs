//! Package removal
//!
//! Deletes, in a fixed order, every path installation created for one
//! specific version: library files first, then control/sql files and
//! binaries, then the archive cache, then the link marker, then the
//! installed marker. Deleting a nonexistent path is a no-op, so the
//! operation is safely repeatable after a partial failure.

use pgwarden_core::types::InstalledExtension;
use pgwarden_core::{Error, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

use crate::fs::FileSystem;
use crate::layout::{self, ExtensionLayout};
use crate::package::{self, EntryKind, InstallManifest};

/// Uninstalls one previously-installed extension package from one pod
pub struct ExtensionUninstaller {
    fs: Arc<dyn FileSystem>,
    layout: ExtensionLayout,
    extension: InstalledExtension,
    package_name: String,
}

impl ExtensionUninstaller {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: ExtensionLayout,
        extension: InstalledExtension,
    ) -> Self {
        let package_name = layout::package_name(&extension);
        Self {
            fs,
            layout,
            extension,
            package_name,
        }
    }

    /// Whether the `.installed` marker exists
    pub fn is_extension_installed(&self) -> bool {
        self.fs.exists(&self.layout.installed_marker(&self.extension))
    }

    /// Remove every filesystem artifact this package's installation created
    ///
    /// The file set comes from the cached archive's manifest, so only paths
    /// belonging to this exact version are touched; a still-installed
    /// sibling version keeps its own files.
    pub fn uninstall_extension(&self) -> Result<()> {
        let manifest = self.manifest()?;

        // Library files and their links come out first while the package
        // is still marked installed
        for link in manifest.relocation_links(&self.layout) {
            self.fs.delete_if_exists(&link.link)?;
        }
        for link in &manifest.links {
            self.fs.delete_if_exists(&link.link)?;
        }
        for target in self.targets_of(&manifest, EntryKind::Library) {
            self.fs.delete_if_exists(&target)?;
        }
        for target in self.targets_of(&manifest, EntryKind::VersionedLibrary) {
            self.fs.delete_if_exists(&target)?;
        }
        for target in self.targets_of(&manifest, EntryKind::Binary) {
            self.fs.delete_if_exists(&target)?;
        }

        for target in self.targets_of(&manifest, EntryKind::ExtensionFile) {
            self.fs.delete_if_exists(&target)?;
        }

        self.fs
            .delete_if_exists(&self.layout.package_path(&self.extension))?;
        self.fs
            .delete_if_exists(&self.layout.checksum_path(&self.extension))?;
        self.fs
            .delete_if_exists(&self.layout.pending_marker(&self.extension))?;

        self.fs
            .delete_if_exists(&self.layout.links_created_marker(&self.extension))?;
        self.fs
            .delete_if_exists(&self.layout.installed_marker(&self.extension))?;
        Ok(())
    }

    /// Manifest of the cached archive; a missing archive degrades to an
    /// empty manifest so the markers still come off
    fn manifest(&self) -> Result<InstallManifest> {
        match self.fs.read(&self.layout.package_path(&self.extension)) {
            Ok(bytes) => package::scan_package(&self.package_name, &bytes, &self.layout),
            Err(Error::Filesystem(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Package archive for {} is missing; removing markers only",
                    self.package_name
                );
                Ok(InstallManifest::default())
            }
            Err(error) => Err(error),
        }
    }

    fn targets_of(&self, manifest: &InstallManifest, kind: EntryKind) -> Vec<PathBuf> {
        manifest
            .files
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.target.clone())
            .collect()
    }
}
