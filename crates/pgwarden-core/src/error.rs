//! Error types for pgwarden-core

use thiserror::Error;

/// Result type alias using pgwarden-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for pgwarden
///
/// Every variant except `StatusConflict` is fatal for a single extension
/// only: the reconciler catches it, records it, and keeps processing the
/// remaining extensions of the same pass.
#[derive(Error, Debug)]
pub enum Error {
    /// No extension metadata resolves for the requested name/version/target
    #[error("Extension not found: {description}")]
    NotFound { description: String },

    /// Two unversioned candidates satisfy the same target
    #[error("Ambiguous extension resolution for {description}: versions {first} and {second} both match the requested target")]
    Ambiguous {
        description: String,
        first: String,
        second: String,
    },

    /// Package checksum does not match the package bytes
    #[error("Integrity check failed for {package}: expected SHA-256 {expected}, got {actual}")]
    Integrity {
        package: String,
        expected: String,
        actual: String,
    },

    /// Checksum file carries no valid signature from the publisher
    #[error("Signature verification failed for {package}: {message}")]
    Signature { package: String, message: String },

    /// I/O failure during copy/link/permission/delete
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    /// Malformed package archive
    #[error("Invalid package {package}: {message}")]
    InvalidPackage { package: String, message: String },

    /// Repository index could not be fetched or parsed
    #[error("Repository error for {repository}: {message}")]
    Repository { repository: String, message: String },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Optimistic status update lost the race against a concurrent writer
    #[error("Cluster status update conflict: resource version {expected} is stale")]
    StatusConflict { expected: String },
}

impl Error {
    /// Create a not found error
    pub fn not_found(description: impl Into<String>) -> Self {
        Self::NotFound {
            description: description.into(),
        }
    }

    /// Create an ambiguous resolution error
    pub fn ambiguous(
        description: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::Ambiguous {
            description: description.into(),
            first: first.into(),
            second: second.into(),
        }
    }

    /// Create an integrity error
    pub fn integrity(
        package: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Integrity {
            package: package.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a signature error
    pub fn signature(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Signature {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Create an invalid package error
    pub fn invalid_package(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPackage {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Create a repository error
    pub fn repository(repository: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Repository {
            repository: repository.into(),
            message: message.into(),
        }
    }

    /// Create a status conflict error
    pub fn status_conflict(expected: impl Into<String>) -> Self {
        Self::StatusConflict {
            expected: expected.into(),
        }
    }
}
