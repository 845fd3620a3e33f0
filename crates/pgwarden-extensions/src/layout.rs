//! On-disk layout and artifact naming
//!
//! Everything about a package's footprint is deterministic from the
//! resolved extension record and the reconciliation config: the cache file
//! names, the lifecycle marker names, and the directories of the pod's
//! extension tree. Keeping this in one place is what makes install,
//! uninstall, and conflict detection agree on the same paths.

use pgwarden_core::types::InstalledExtension;
use pgwarden_core::{Error, ExtensionsConfig, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// Suffix of the cached package archive
pub const TGZ_SUFFIX: &str = ".tgz";

/// Suffix of the detached checksum file
pub const SHA256_SUFFIX: &str = ".tgz.sha256";

/// Marker: installation completed successfully
pub const INSTALLED_SUFFIX: &str = ".installed";

/// Marker: installation deferred until the database process restarts
pub const PENDING_SUFFIX: &str = ".pending";

/// Marker: relocation symlinks exist for this package
pub const LINKS_CREATED_SUFFIX: &str = ".links-created";

/// Well-known path of the repository index under the repository URI
const INDEX_PATH: &[&str] = &["v1", "index.json"];

/// Build the repository index URI
pub fn index_uri(repository: &Url) -> Result<Url> {
    extend_uri(repository, INDEX_PATH)
}

/// Build the package archive URI for a resolved extension
pub fn package_uri(repository: &Url, extension: &InstalledExtension) -> Result<Url> {
    let file = format!("{}{}", package_name(extension), TGZ_SUFFIX);
    extend_uri(repository, &[extension.publisher.as_str(), file.as_str()])
}

/// Build the detached checksum URI for a resolved extension
pub fn checksum_uri(repository: &Url, extension: &InstalledExtension) -> Result<Url> {
    let file = format!("{}{}", package_name(extension), SHA256_SUFFIX);
    extend_uri(repository, &[extension.publisher.as_str(), file.as_str()])
}

fn extend_uri(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut uri = base.clone();
    uri.path_segments_mut()
        .map_err(|_| Error::repository(base.as_str(), "repository URI cannot be a base"))?
        .pop_if_empty()
        .extend(segments);
    Ok(uri)
}

/// Deterministic package base name for a resolved extension
///
/// `{name}-{version}-pg{postgresMajor}` with a `-build-{buildMajor}`
/// suffix for build-specific artifacts; any-build artifacts omit it.
pub fn package_name(extension: &InstalledExtension) -> String {
    match &extension.build {
        Some(build) => format!(
            "{}-{}-pg{}-build-{}",
            extension.name, extension.version, extension.postgres_version, build
        ),
        None => format!(
            "{}-{}-pg{}",
            extension.name, extension.version, extension.postgres_version
        ),
    }
}

/// The pod's extension directory tree
///
/// Mirrors a standard engine install tree under the per-pod extensions
/// root, plus the relocated-library directory the running server actually
/// loads from and a versioned-ABI library directory.
#[derive(Debug, Clone)]
pub struct ExtensionLayout {
    root: PathBuf,
    postgres_major: String,
}

impl ExtensionLayout {
    /// Derive the layout from the reconciliation config
    pub fn new(config: &ExtensionsConfig) -> Self {
        Self {
            root: config.extensions_path.clone(),
            postgres_major: config.postgres_major().to_string(),
        }
    }

    /// Extensions root; package caches and lifecycle markers live here
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared-library directory (`usr/lib/postgresql/<major>/lib`)
    pub fn lib_path(&self) -> PathBuf {
        self.root
            .join("usr/lib/postgresql")
            .join(&self.postgres_major)
            .join("lib")
    }

    /// Binary directory (`usr/lib/postgresql/<major>/bin`)
    pub fn bin_path(&self) -> PathBuf {
        self.root
            .join("usr/lib/postgresql")
            .join(&self.postgres_major)
            .join("bin")
    }

    /// Control/SQL directory (`usr/share/postgresql/<major>/extension`)
    pub fn share_extension_path(&self) -> PathBuf {
        self.root
            .join("usr/share/postgresql")
            .join(&self.postgres_major)
            .join("extension")
    }

    /// Versioned-ABI library directory (`usr/lib64`)
    pub fn lib64_path(&self) -> PathBuf {
        self.root.join("usr/lib64")
    }

    /// Relocated-library directory the running server loads from
    pub fn relocated_lib_path(&self) -> PathBuf {
        self.root.join("relocated/lib")
    }

    /// Cached package archive path
    pub fn package_path(&self, extension: &InstalledExtension) -> PathBuf {
        self.root
            .join(format!("{}{}", package_name(extension), TGZ_SUFFIX))
    }

    /// Cached checksum file path
    pub fn checksum_path(&self, extension: &InstalledExtension) -> PathBuf {
        self.root
            .join(format!("{}{}", package_name(extension), SHA256_SUFFIX))
    }

    /// `.installed` marker path
    pub fn installed_marker(&self, extension: &InstalledExtension) -> PathBuf {
        self.root
            .join(format!("{}{}", package_name(extension), INSTALLED_SUFFIX))
    }

    /// `.pending` marker path
    pub fn pending_marker(&self, extension: &InstalledExtension) -> PathBuf {
        self.root
            .join(format!("{}{}", package_name(extension), PENDING_SUFFIX))
    }

    /// `.links-created` marker path; co-located with the relocation links
    pub fn links_created_marker(&self, extension: &InstalledExtension) -> PathBuf {
        self.relocated_lib_path().join(format!(
            "{}{}",
            package_name(extension),
            LINKS_CREATED_SUFFIX
        ))
    }
}
