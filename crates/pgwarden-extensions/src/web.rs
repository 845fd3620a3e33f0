//! Repository transport
//!
//! A thin trait over authenticated HTTP GET so the resolver and installer
//! can be tested against canned responses. Timeouts and TLS are the
//! transport's concern; callers see bytes or a repository error.

use async_trait::async_trait;
use pgwarden_core::{Error, Result};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches documents and package bytes from an extensions repository
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebClient: Send + Sync {
    /// GET the resource at `uri` and return its bytes
    async fn get_bytes(&self, uri: &Url) -> Result<Vec<u8>>;
}

/// [`WebClient`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| Error::repository("<client>", error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebClient for HttpClient {
    async fn get_bytes(&self, uri: &Url) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(uri.clone())
            .send()
            .await
            .map_err(|error| Error::repository(uri.as_str(), error.to_string()))?;
        if !response.status().is_success() {
            return Err(Error::repository(
                uri.as_str(),
                format!("HTTP {}", response.status()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|error| Error::repository(uri.as_str(), error.to_string()))?;
        Ok(bytes.to_vec())
    }
}
