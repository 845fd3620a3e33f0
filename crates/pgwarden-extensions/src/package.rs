//! Package archive handling
//!
//! An extension package is a gzipped tarball whose entries sit under four
//! top-level directories, each mapping to one directory of the pod's
//! extension tree:
//!
//! ```text
//! lib/             -> usr/lib/postgresql/<major>/lib      (shared libraries)
//! share/extension/ -> usr/share/postgresql/<major>/extension (control/sql)
//! bin/             -> usr/lib/postgresql/<major>/bin      (binaries)
//! lib64/           -> usr/lib64                           (ABI-versioned libraries)
//! ```
//!
//! Scanning an archive yields an [`InstallManifest`]: the full set of paths
//! installation will create. Install, uninstall, and conflict detection all
//! derive their path sets from the same manifest, which is what keeps them
//! in agreement.

use flate2::read::GzDecoder;
use pgwarden_core::{Error, Result};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

use crate::layout::ExtensionLayout;

/// Classification of a package entry by its target directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// File under the shared-library directory
    Library,
    /// Control/SQL file under the share/extension directory
    ExtensionFile,
    /// Executable under the binary directory
    Binary,
    /// ABI-versioned library under lib64
    VersionedLibrary,
}

/// One regular file the package installs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub kind: EntryKind,
    pub target: PathBuf,
}

/// One symbolic link the package installs (ABI-version links in lib64)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    pub link: PathBuf,
    pub target: PathBuf,
}

/// The deterministic filesystem footprint of one package
#[derive(Debug, Clone, Default)]
pub struct InstallManifest {
    /// Regular files, in archive order
    pub files: Vec<ManifestEntry>,

    /// ABI-version symlinks; several links may share one target
    pub links: Vec<LinkSpec>,
}

impl InstallManifest {
    /// Target paths of shared-library files (`*.so` under the lib dir)
    ///
    /// These are the paths a running backend may have memory-mapped, so
    /// they are the ones conflict detection checks and relocation links
    /// point at.
    pub fn shared_libraries(&self) -> Vec<&PathBuf> {
        self.files
            .iter()
            .filter(|entry| entry.kind == EntryKind::Library && is_shared_object(&entry.target))
            .map(|entry| &entry.target)
            .collect()
    }

    /// Relocation links: `relocated/lib/X.so -> <lib dir>/X.so`
    pub fn relocation_links(&self, layout: &ExtensionLayout) -> Vec<LinkSpec> {
        let relocated = layout.relocated_lib_path();
        self.shared_libraries()
            .into_iter()
            .filter_map(|target| {
                target.file_name().map(|name| LinkSpec {
                    link: relocated.join(name),
                    target: target.clone(),
                })
            })
            .collect()
    }
}

fn is_shared_object(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension == "so")
}

/// Scan a package archive into its install manifest without touching the
/// installed filesystem area
pub fn scan_package(
    package_name: &str,
    bytes: &[u8],
    layout: &ExtensionLayout,
) -> Result<InstallManifest> {
    let mut manifest = InstallManifest::default();
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|error| Error::invalid_package(package_name, error.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|error| Error::invalid_package(package_name, error.to_string()))?;
        let path = entry
            .path()
            .map_err(|error| Error::invalid_package(package_name, error.to_string()))?
            .into_owned();
        let Some((kind, target)) = classify(&path, layout) else {
            continue;
        };
        if entry.header().entry_type().is_symlink() {
            let link_target = entry
                .link_name()
                .map_err(|error| Error::invalid_package(package_name, error.to_string()))?
                .ok_or_else(|| {
                    Error::invalid_package(package_name, format!("symlink entry {} has no target", path.display()))
                })?;
            let resolved = target
                .parent()
                .unwrap_or_else(|| layout.root())
                .join(link_target.as_ref());
            manifest.links.push(LinkSpec {
                link: target,
                target: resolved,
            });
            continue;
        }
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if kind == EntryKind::VersionedLibrary {
            if let Some(link) = abi_link_name(&target) {
                manifest.links.push(LinkSpec {
                    link,
                    target: target.clone(),
                });
            }
        }
        manifest.files.push(ManifestEntry { kind, target });
    }
    Ok(manifest)
}

/// Stream every regular file of the archive to `write`, already mapped to
/// its target path
pub fn extract_files<F>(
    package_name: &str,
    bytes: &[u8],
    layout: &ExtensionLayout,
    mut write: F,
) -> Result<()>
where
    F: FnMut(&ManifestEntry, &[u8]) -> Result<()>,
{
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let entries = archive
        .entries()
        .map_err(|error| Error::invalid_package(package_name, error.to_string()))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|error| Error::invalid_package(package_name, error.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|error| Error::invalid_package(package_name, error.to_string()))?
            .into_owned();
        let Some((kind, target)) = classify(&path, layout) else {
            continue;
        };
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|error| Error::invalid_package(package_name, error.to_string()))?;
        write(&ManifestEntry { kind, target }, &content)?;
    }
    Ok(())
}

/// Map an archive-relative path to its kind and target path, or `None` for
/// entries outside the recognized tree (directory entries, stray files)
fn classify(path: &Path, layout: &ExtensionLayout) -> Option<(EntryKind, PathBuf)> {
    let mut components = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>();
    if components.len() < 2 {
        return None;
    }
    let top = components.remove(0);
    match top.as_str() {
        "lib" => Some((EntryKind::Library, join_all(layout.lib_path(), &components))),
        "bin" => Some((EntryKind::Binary, join_all(layout.bin_path(), &components))),
        "lib64" => Some((
            EntryKind::VersionedLibrary,
            join_all(layout.lib64_path(), &components),
        )),
        "share" => {
            if components.first().map(String::as_str) == Some("extension") {
                Some((
                    EntryKind::ExtensionFile,
                    join_all(layout.share_extension_path(), &components[1..]),
                ))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn join_all(mut base: PathBuf, components: &[String]) -> PathBuf {
    for component in components {
        base.push(component);
    }
    base
}

/// Derive the ABI-version link for a versioned library file:
/// `X.so.N.M` gets a sibling link `X.so.N`
fn abi_link_name(target: &Path) -> Option<PathBuf> {
    let name = target.file_name()?.to_string_lossy();
    let (stem, versions) = name.split_once(".so.")?;
    let components = versions.split('.').collect::<Vec<_>>();
    if components.len() < 2 || !components.iter().all(|c| c.chars().all(|ch| ch.is_ascii_digit())) {
        return None;
    }
    let link_version = components[..components.len() - 1].join(".");
    Some(
        target
            .parent()?
            .join(format!("{}.so.{}", stem, link_version)),
    )
}
