//! Extension reconciliation configuration
//!
//! All values the resolver and installer used to read from process-wide
//! constants live here instead, so tests and the agent binary can pass
//! their own.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Default channel name used when a requested extension names neither a
/// version nor a channel.
pub const DEFAULT_CHANNEL: &str = "stable";

/// Configuration for one pod's extension reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionsConfig {
    /// Default extensions repository URI
    pub repository: Url,

    /// Channel consulted when no version or channel is requested
    #[serde(default = "default_channel")]
    pub default_channel: String,

    /// Root of the pod's extensions directory tree
    pub extensions_path: PathBuf,

    /// Full PostgreSQL version running on the pod (e.g., "12.4")
    pub postgres_version: String,

    /// Build version of the pod's database image (e.g., "6.0.2")
    pub build_version: String,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

impl ExtensionsConfig {
    /// PostgreSQL major version (leading component of the full version)
    pub fn postgres_major(&self) -> &str {
        major_of(&self.postgres_version)
    }

    /// Build major version (e.g., "6.0" for build "6.0.2")
    ///
    /// Build versions carry two leading components because ABI
    /// compatibility is only guaranteed within a minor build line.
    pub fn build_major(&self) -> &str {
        let build = &self.build_version;
        match build.match_indices('.').nth(1) {
            Some((index, _)) => &build[..index],
            None => build,
        }
    }
}

fn major_of(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}
