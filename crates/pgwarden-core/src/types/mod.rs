//! Type definitions shared across pgwarden crates

mod cluster;
mod index;

pub use cluster::{
    Cluster, ClusterSpec, ClusterStatus, ExtensionSpec, InstalledExtension, PodStatus,
};
pub use index::{ExtensionVersion, IndexExtension, Publisher, RepositoryIndex, Target};
