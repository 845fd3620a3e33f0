//! Filesystem abstraction
//!
//! The installer and uninstaller never touch `std::fs` directly; they go
//! through this trait so their logic is unit-testable without a real
//! filesystem and so every mutation they can perform is enumerable.

use pgwarden_core::Result;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The filesystem operations the extension lifecycle needs
#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    /// Whether a path exists (file, directory, or symlink target)
    fn exists(&self, path: &Path) -> bool;

    /// Create a directory and all missing ancestors; safe to repeat
    fn create_directories(&self, path: &Path) -> Result<()>;

    /// Write `content` to `target`, replacing any previous content
    ///
    /// The write must never leave a half-written file visible under the
    /// final name; implementations write to a temporary sibling and rename.
    fn copy_or_replace(&self, content: &[u8], target: &Path) -> Result<()>;

    /// Create an empty file, truncating any previous content (marker files)
    fn create_or_replace_file(&self, path: &Path) -> Result<()>;

    /// Create a symbolic link at `link` pointing to `target`, replacing any
    /// existing link or file at `link`
    fn create_or_replace_symlink(&self, link: &Path, target: &Path) -> Result<()>;

    /// Apply a POSIX permission mode to a path
    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()>;

    /// Delete a path if it exists; deleting a nonexistent path is a no-op
    fn delete_if_exists(&self, path: &Path) -> Result<()>;

    /// List the direct children of a directory
    fn list(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Read a file's full content
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
}

/// [`FileSystem`] backed by the process's real filesystem
#[derive(Debug, Default, Clone)]
pub struct NativeFileSystem;

impl NativeFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for NativeFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn create_directories(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn copy_or_replace(&self, content: &[u8], target: &Path) -> Result<()> {
        let file_name = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = target.with_file_name(format!(".{}.partial", file_name));
        {
            let mut file = fs::File::create(&staging)?;
            file.write_all(content)?;
            file.sync_all()?;
        }
        fs::rename(&staging, target)?;
        Ok(())
    }

    fn create_or_replace_file(&self, path: &Path) -> Result<()> {
        fs::File::create(path)?;
        Ok(())
    }

    fn create_or_replace_symlink(&self, link: &Path, target: &Path) -> Result<()> {
        if fs::symlink_metadata(link).is_ok() {
            fs::remove_file(link)?;
        }
        std::os::unix::fs::symlink(target, link)?;
        Ok(())
    }

    fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    fn delete_if_exists(&self, path: &Path) -> Result<()> {
        match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path)?,
            Ok(_) => fs::remove_file(path)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        Ok(())
    }

    fn list(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }
}
