//! Package installation
//!
//! The installer materializes a verified package into the pod's extension
//! tree and records lifecycle transitions through marker files. Every
//! operation is idempotent: directory creation is safe to repeat,
//! permissions are reapplied on each call, file copies replace their
//! targets atomically, and symlinks are recreated in place. A pass
//! interrupted at any point is resumed by the next pass re-deriving state
//! from the markers.

use pgwarden_core::types::{InstalledExtension, Publisher};
use pgwarden_core::{Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::fs::FileSystem;
use crate::layout::{self, ExtensionLayout};
use crate::package::{self, EntryKind, InstallManifest, ManifestEntry};
use crate::verify;
use crate::web::WebClient;

/// Mode applied to directories (owner rwx, group rx, other rx)
const DIR_MODE: u32 = 0o755;

/// Mode applied to regular files (owner rw, group r, other r)
const FILE_MODE: u32 = 0o644;

/// Installs one resolved extension package onto one pod
pub struct ExtensionInstaller {
    fs: Arc<dyn FileSystem>,
    web: Arc<dyn WebClient>,
    layout: ExtensionLayout,
    extension: InstalledExtension,
    publisher: Publisher,
    repository: Url,
    package_name: String,
}

impl std::fmt::Debug for ExtensionInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionInstaller")
            .field("layout", &self.layout)
            .field("extension", &self.extension)
            .field("publisher", &self.publisher)
            .field("repository", &self.repository)
            .field("package_name", &self.package_name)
            .finish_non_exhaustive()
    }
}

impl ExtensionInstaller {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        web: Arc<dyn WebClient>,
        layout: ExtensionLayout,
        extension: InstalledExtension,
        publisher: Publisher,
        repository: Url,
    ) -> Self {
        let package_name = layout::package_name(&extension);
        Self {
            fs,
            web,
            layout,
            extension,
            publisher,
            repository,
            package_name,
        }
    }

    /// The status record this installer produces on success
    pub fn installed_record(&self) -> &InstalledExtension {
        &self.extension
    }

    /// Whether the `.installed` marker exists
    pub fn is_extension_installed(&self) -> bool {
        self.fs.exists(&self.layout.installed_marker(&self.extension))
    }

    /// Whether the `.pending` marker exists
    pub fn is_extension_pending_overwrite(&self) -> bool {
        self.fs.exists(&self.layout.pending_marker(&self.extension))
    }

    /// Whether the `.links-created` marker exists
    pub fn is_links_created(&self) -> bool {
        self.fs
            .exists(&self.layout.links_created_marker(&self.extension))
    }

    /// Fetch the package and its checksum into the local cache
    ///
    /// A cache hit is recognized by the file names alone; the cache is
    /// keyed by the exact version string, so staleness cannot occur
    /// without a version change.
    pub async fn download_and_extract(&self) -> Result<()> {
        let package_path = self.layout.package_path(&self.extension);
        let checksum_path = self.layout.checksum_path(&self.extension);
        if self.fs.exists(&package_path) && self.fs.exists(&checksum_path) {
            debug!("Package {} already cached", self.package_name);
            return Ok(());
        }

        let downloads = [
            (layout::package_uri(&self.repository, &self.extension)?, package_path),
            (layout::checksum_uri(&self.repository, &self.extension)?, checksum_path),
        ];
        for (uri, path) in downloads {
            debug!("Downloading {} to {}", uri, path.display());
            let bytes = self.web.get_bytes(&uri).await?;
            self.fs.create_directories(self.layout.root())?;
            self.fs.copy_or_replace(&bytes, &path)?;
            self.fs.set_permissions(&path, FILE_MODE)?;
        }
        Ok(())
    }

    /// Verify the cached package's digest and publisher signature
    ///
    /// Side-effect free; reads only the cache area.
    pub fn verify(&self) -> Result<()> {
        let package = self.fs.read(&self.layout.package_path(&self.extension))?;
        let checksum = self.fs.read(&self.layout.checksum_path(&self.extension))?;
        verify::verify_package(&self.package_name, &package, &checksum, &self.publisher)
    }

    /// Whether installing would overwrite a shared-library file that
    /// already exists on disk
    ///
    /// The running backend may have such a file memory-mapped; replacing
    /// it in place is unsafe until the backend restarts. Never mutates
    /// state.
    pub fn does_install_overwrite_any_shared_library(&self) -> Result<bool> {
        let manifest = self.manifest()?;
        Ok(manifest
            .shared_libraries()
            .into_iter()
            .any(|target| self.fs.exists(target)))
    }

    /// Write the `.pending` marker: installation is deferred until restart
    pub fn set_extension_as_pending(&self) -> Result<()> {
        self.fs
            .create_or_replace_file(&self.layout.pending_marker(&self.extension))
    }

    /// Materialize the cached package into the extension tree
    pub fn install_extension(&self) -> Result<()> {
        let bytes = self.fs.read(&self.layout.package_path(&self.extension))?;
        let manifest = package::scan_package(&self.package_name, &bytes, &self.layout)?;

        for dir in self.target_directories(&manifest) {
            self.ensure_directory(&dir)?;
        }

        package::extract_files(&self.package_name, &bytes, &self.layout, |entry, content| {
            self.fs.copy_or_replace(content, &entry.target)?;
            self.fs.set_permissions(&entry.target, FILE_MODE)
        })?;

        for link in &manifest.links {
            self.fs.create_or_replace_symlink(&link.link, &link.target)?;
        }
        self.create_links(&manifest)?;

        // Pendingness is resolved: the overwrite has actually happened
        self.fs
            .delete_if_exists(&self.layout.pending_marker(&self.extension))?;
        self.fs
            .create_or_replace_file(&self.layout.installed_marker(&self.extension))?;
        Ok(())
    }

    /// Recreate only the relocation symlinks and their marker
    ///
    /// Used when the package's files are already installed but the links
    /// are missing; cheaper than a full reinstall and safe to repeat. When
    /// the cached archive is gone the link set is recovered from the
    /// shared libraries already on disk.
    pub fn create_extension_links(&self) -> Result<()> {
        let manifest = match self.fs.read(&self.layout.package_path(&self.extension)) {
            Ok(bytes) => package::scan_package(&self.package_name, &bytes, &self.layout)?,
            Err(Error::Filesystem(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                self.libraries_on_disk()?
            }
            Err(error) => return Err(error),
        };
        self.ensure_directory(&self.layout.relocated_lib_path())?;
        self.create_links(&manifest)
    }

    /// The shared libraries present in the lib directory, as a manifest
    fn libraries_on_disk(&self) -> Result<InstallManifest> {
        let mut manifest = InstallManifest::default();
        let lib_path = self.layout.lib_path();
        if !self.fs.exists(&lib_path) {
            return Ok(manifest);
        }
        for target in self.fs.list(&lib_path)? {
            if target.extension().is_some_and(|extension| extension == "so") {
                manifest.files.push(ManifestEntry {
                    kind: EntryKind::Library,
                    target,
                });
            }
        }
        Ok(manifest)
    }

    fn create_links(&self, manifest: &InstallManifest) -> Result<()> {
        for link in manifest.relocation_links(&self.layout) {
            self.fs.create_or_replace_symlink(&link.link, &link.target)?;
        }
        self.fs
            .create_or_replace_file(&self.layout.links_created_marker(&self.extension))
    }

    fn manifest(&self) -> Result<InstallManifest> {
        let bytes = self.fs.read(&self.layout.package_path(&self.extension))?;
        package::scan_package(&self.package_name, &bytes, &self.layout)
    }

    fn target_directories(&self, manifest: &InstallManifest) -> BTreeSet<PathBuf> {
        let mut directories = BTreeSet::new();
        for entry in &manifest.files {
            if let Some(parent) = entry.target.parent() {
                directories.insert(parent.to_path_buf());
            }
        }
        for link in &manifest.links {
            if let Some(parent) = link.link.parent() {
                directories.insert(parent.to_path_buf());
            }
        }
        directories.insert(self.layout.relocated_lib_path());
        directories
    }

    /// Create a directory chain and reapply directory permissions on every
    /// level below the extensions root
    fn ensure_directory(&self, dir: &Path) -> Result<()> {
        self.fs.create_directories(dir)?;
        let mut chain = Vec::new();
        let mut current = dir;
        while current != self.layout.root() && current.starts_with(self.layout.root()) {
            chain.push(current.to_path_buf());
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        for path in chain.iter().rev() {
            self.fs.set_permissions(path, DIR_MODE)?;
        }
        Ok(())
    }
}
