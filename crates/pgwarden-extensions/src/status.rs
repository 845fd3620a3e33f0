//! Cluster status persistence
//!
//! The reconciler's only externally-visible shared mutable resource is the
//! cluster's status object. Updates go through this trait with
//! optimistic-concurrency semantics: the write compares the cluster's
//! resource version against the stored one and fails with
//! [`Error::StatusConflict`] when a concurrent writer got there first, in
//! which case the whole pass is retried on the next scheduled cycle rather
//! than merged field-by-field.
//!
//! [`Error::StatusConflict`]: pgwarden_core::Error::StatusConflict

use async_trait::async_trait;
use pgwarden_core::types::Cluster;
use pgwarden_core::Result;

/// Persists a mutated cluster status back to the owning resource
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Write `cluster.status` through a resource-version-checked update
    async fn update_status(&self, cluster: &Cluster) -> Result<()>;
}
