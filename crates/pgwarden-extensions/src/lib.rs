//! Extension lifecycle reconciliation for pgwarden
//!
//! This crate handles:
//! - Repository index fetching and version/channel resolution
//! - Package download, caching, and signature verification
//! - Marker-file-driven installation and removal on a pod's filesystem
//! - Shared-library overwrite detection and pending-restart deferral
//! - The per-pod reconciliation pass tying the above together

pub mod fs;
pub mod installer;
pub mod layout;
pub mod manager;
pub mod package;
pub mod reconciler;
pub mod resolver;
pub mod status;
pub mod uninstaller;
pub mod verify;
pub mod web;

pub use fs::{FileSystem, NativeFileSystem};
pub use installer::ExtensionInstaller;
pub use layout::ExtensionLayout;
pub use manager::ExtensionManager;
pub use reconciler::{
    ExtensionReconciler, LoggingHooks, ReconciliationHooks, ReconciliationResult,
};
pub use resolver::{ExtensionMetadata, MetadataResolver};
pub use status::StatusWriter;
pub use uninstaller::ExtensionUninstaller;
pub use web::{HttpClient, WebClient};
