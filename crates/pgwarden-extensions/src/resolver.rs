//! Extension identity and metadata resolution
//!
//! Resolves a requested extension (name, publisher, optional repository,
//! optional version or channel) against the pod's engine version and build
//! to exactly one installable artifact. The repository index is fetched
//! once per process run and cached in memory; every pass of the same run
//! resolves against the same index.

use pgwarden_core::types::{
    ExtensionSpec, ExtensionVersion, IndexExtension, InstalledExtension, Publisher,
    RepositoryIndex, Target,
};
use pgwarden_core::{Error, ExtensionsConfig, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::layout;
use crate::web::WebClient;

/// A fully-resolved installable artifact descriptor
#[derive(Debug, Clone)]
pub struct ExtensionMetadata {
    /// Index entry the artifact belongs to
    pub extension: IndexExtension,

    /// The resolved version
    pub version: ExtensionVersion,

    /// The compatibility target the artifact was selected for
    pub target: Target,

    /// The publisher whose key verifies the artifact
    pub publisher: Publisher,

    /// Repository the artifact is served from
    pub repository: Url,
}

impl ExtensionMetadata {
    /// The status record this artifact produces once installed
    pub fn to_installed(&self, config: &ExtensionsConfig) -> InstalledExtension {
        InstalledExtension {
            name: self.extension.name.clone(),
            publisher: self.extension.publisher.clone(),
            repository: self.repository.as_str().trim_end_matches('/').to_string(),
            version: self.version.version.clone(),
            postgres_version: config.postgres_major().to_string(),
            build: self.target.build.clone(),
        }
    }
}

/// Resolves extension requests against repository indexes
pub struct MetadataResolver {
    web: Arc<dyn WebClient>,
    config: ExtensionsConfig,
    indexes: Mutex<HashMap<Url, Arc<RepositoryIndex>>>,
}

impl MetadataResolver {
    pub fn new(web: Arc<dyn WebClient>, config: ExtensionsConfig) -> Self {
        Self {
            web,
            config,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ExtensionsConfig {
        &self.config
    }

    /// Load a repository index, cached for the lifetime of the process run
    pub async fn index(&self, repository: &Url) -> Result<Arc<RepositoryIndex>> {
        let mut indexes = self.indexes.lock().await;
        if let Some(index) = indexes.get(repository) {
            return Ok(Arc::clone(index));
        }
        let uri = layout::index_uri(repository)?;
        debug!("Fetching repository index from {}", uri);
        let bytes = self.web.get_bytes(&uri).await?;
        let index: RepositoryIndex = serde_json::from_slice(&bytes)
            .map_err(|error| Error::repository(repository.as_str(), error.to_string()))?;
        let index = Arc::new(index);
        indexes.insert(repository.clone(), Arc::clone(&index));
        Ok(index)
    }

    /// Resolve a desired-state request to exactly one artifact
    ///
    /// A channel request is mapped to its version first; an unversioned
    /// request falls back to the repository's default channel when the
    /// extension defines it. Ambiguity between remaining candidates is an
    /// error rather than a silent pick, so successive passes cannot flip
    /// between equally valid versions.
    pub async fn resolve(&self, spec: &ExtensionSpec) -> Result<ExtensionMetadata> {
        let repository = self.repository_of(spec.repository.as_deref())?;
        let index = self.index(&repository).await?;
        let entry = index
            .extensions
            .iter()
            .find(|candidate| {
                candidate.name == spec.name && candidate.publisher == spec.publisher
            })
            .ok_or_else(|| Error::not_found(describe(spec)))?;

        let requested_version = self.requested_version(spec, entry)?;
        let candidates = entry
            .versions
            .iter()
            .filter(|version| {
                requested_version
                    .as_deref()
                    .is_none_or(|requested| version.version == requested)
            })
            .collect::<Vec<_>>();

        let (version, target) = self.select_target(spec, &candidates)?;
        let publisher = index
            .find_publisher(&entry.publisher)
            .ok_or_else(|| {
                Error::repository(
                    repository.as_str(),
                    format!("publisher {} is not registered in the index", entry.publisher),
                )
            })?
            .clone();
        let repository = match &entry.repository {
            Some(uri) => Url::parse(uri)
                .map_err(|error| Error::repository(uri, error.to_string()))?,
            None => repository,
        };

        Ok(ExtensionMetadata {
            extension: entry.clone(),
            version: version.clone(),
            target,
            publisher,
            repository,
        })
    }

    /// Resolve the metadata of an already-recorded installed extension
    ///
    /// Used when the desired state arrives pre-resolved; the exact version
    /// is known, so only the index lookup and target selection remain.
    pub async fn resolve_installed(
        &self,
        installed: &InstalledExtension,
    ) -> Result<ExtensionMetadata> {
        let spec = ExtensionSpec {
            name: installed.name.clone(),
            publisher: installed.publisher.clone(),
            repository: Some(installed.repository.clone()),
            version: Some(installed.version.clone()),
            channel: None,
        };
        self.resolve(&spec).await
    }

    fn repository_of(&self, repository: Option<&str>) -> Result<Url> {
        match repository {
            Some(uri) => {
                Url::parse(uri).map_err(|error| Error::repository(uri, error.to_string()))
            }
            None => Ok(self.config.repository.clone()),
        }
    }

    /// Determine the version constraint of a request
    ///
    /// Explicit version wins; an explicit channel must exist; otherwise the
    /// default channel applies when the extension defines it, and an
    /// extension without it is resolved unconstrained.
    fn requested_version(
        &self,
        spec: &ExtensionSpec,
        entry: &IndexExtension,
    ) -> Result<Option<String>> {
        if let Some(version) = &spec.version {
            return Ok(Some(version.clone()));
        }
        if let Some(channel) = &spec.channel {
            return entry
                .channels
                .get(channel)
                .cloned()
                .map(Some)
                .ok_or_else(|| {
                    Error::not_found(format!("{} (channel {})", describe(spec), channel))
                });
        }
        Ok(entry.channels.get(&self.config.default_channel).cloned())
    }

    /// Pick the artifact target: an exact (postgres major, build major)
    /// match always wins over a major-version-only match
    fn select_target<'a>(
        &self,
        spec: &ExtensionSpec,
        candidates: &[&'a ExtensionVersion],
    ) -> Result<(&'a ExtensionVersion, Target)> {
        let postgres_major = self.config.postgres_major();
        let build_major = self.config.build_major();

        let exact = matching(candidates, |target| {
            target.postgres_version == postgres_major
                && target.build.as_deref() == Some(build_major)
        });
        let matches = if exact.is_empty() {
            matching(candidates, |target| {
                target.postgres_version == postgres_major && target.build.is_none()
            })
        } else {
            exact
        };

        // An index listing the same version twice is not ambiguous
        let mut unique: Vec<(&ExtensionVersion, Target)> = Vec::new();
        for (version, target) in matches {
            if !unique.iter().any(|(seen, _)| seen.version == version.version) {
                unique.push((version, target));
            }
        }

        match unique.as_slice() {
            [] => Err(Error::not_found(format!(
                "{} for postgres {} build {}",
                describe(spec),
                postgres_major,
                build_major
            ))),
            [(version, target)] => Ok((version, target.clone())),
            [(first, _), (second, _), ..] => Err(Error::ambiguous(
                describe(spec),
                &first.version,
                &second.version,
            )),
        }
    }
}

fn matching<'a>(
    candidates: &[&'a ExtensionVersion],
    predicate: impl Fn(&Target) -> bool,
) -> Vec<(&'a ExtensionVersion, Target)> {
    candidates
        .iter()
        .filter_map(|version| {
            version
                .available_for
                .iter()
                .find(|target| predicate(target))
                .map(|target| (*version, target.clone()))
        })
        .collect()
}

fn describe(spec: &ExtensionSpec) -> String {
    match &spec.version {
        Some(version) => format!("{}/{} {}", spec.publisher, spec.name, version),
        None => format!("{}/{}", spec.publisher, spec.name),
    }
}
