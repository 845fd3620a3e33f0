//! Repository index document types
//!
//! The extensions repository serves a JSON index at a well-known path under
//! the repository URI. It lists publishers (with their signing keys) and
//! extensions, each with channel aliases and versioned artifacts declaring
//! which (postgres major, build major) targets they support.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level repository index document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// Signing identities that vouch for extension packages
    #[serde(default)]
    pub publishers: Vec<Publisher>,

    /// Extensions available from this repository
    #[serde(default)]
    pub extensions: Vec<IndexExtension>,
}

impl RepositoryIndex {
    /// Find a publisher by its identifier
    pub fn find_publisher(&self, id: &str) -> Option<&Publisher> {
        self.publishers.iter().find(|publisher| publisher.id == id)
    }
}

/// A signing identity registered in the repository
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    /// Publisher identifier (e.g., "com.ongres")
    pub id: String,

    /// Publisher display name
    #[serde(default)]
    pub name: Option<String>,

    /// PEM-encoded public key used to verify package checksum signatures
    pub public_key: String,
}

/// An extension entry in the repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexExtension {
    /// Extension name
    pub name: String,

    /// Publisher identifier; must reference a registered publisher
    pub publisher: String,

    /// Repository URI override; absent when the extension is served from
    /// the same repository as the index
    #[serde(default)]
    pub repository: Option<String>,

    /// Channel aliases mapping a channel name to a version string
    #[serde(default)]
    pub channels: HashMap<String, String>,

    /// Published versions
    #[serde(default)]
    pub versions: Vec<ExtensionVersion>,
}

/// One published version of an extension
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionVersion {
    /// Version string, matched exactly (not semver-interpreted)
    pub version: String,

    /// Compatibility targets this version was built for
    #[serde(default)]
    pub available_for: Vec<Target>,
}

/// A (postgres major, build major) compatibility pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// PostgreSQL major version (e.g., "12")
    pub postgres_version: String,

    /// Build major version; absent means the artifact works on any build
    #[serde(default)]
    pub build: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_index_document() {
        let json = r#"{
            "publishers": [
                {"id": "com.ongres", "publicKey": "-----BEGIN PUBLIC KEY-----"}
            ],
            "extensions": [
                {
                    "name": "timescaledb",
                    "publisher": "com.ongres",
                    "channels": {"stable": "1.7.1"},
                    "versions": [
                        {
                            "version": "1.7.1",
                            "availableFor": [
                                {"postgresVersion": "12", "build": "6.0"},
                                {"postgresVersion": "12"}
                            ]
                        }
                    ]
                }
            ]
        }"#;

        let index: RepositoryIndex = serde_json::from_str(json).unwrap();
        assert_eq!(index.publishers.len(), 1);
        assert!(index.find_publisher("com.ongres").is_some());
        assert!(index.find_publisher("org.other").is_none());

        let extension = &index.extensions[0];
        assert_eq!(extension.channels.get("stable").unwrap(), "1.7.1");
        let targets = &extension.versions[0].available_for;
        assert_eq!(targets[0].build.as_deref(), Some("6.0"));
        assert_eq!(targets[1].build, None);
    }
}
