//! Tarball download over HTTP.
//!
//! Downloads plugin tarballs directly over HTTP — never through the npm
//! CLI — and unpacks them into a caller-owned working directory. Download
//! size is enforced while streaming so a lying `Content-Length` cannot
//! bypass the limit.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::extract;

/// Default maximum tarball size (50 MB).
const DEFAULT_MAX_SIZE: u64 = 50 * 1024 * 1024;

/// Default HTTP request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads a tarball and unpacks it into a working directory.
///
/// The seam the ingest pipeline uses for its one download; swap in a fake
/// for tests or a caching implementation for CI.
#[async_trait]
pub trait TarballFetcher: Send + Sync {
    /// Download the tarball at `url` with the given extra headers and unpack
    /// it into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error on network failures, non-success responses, size
    /// limit violations, or extraction failures.
    async fn fetch(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        dest: &Path,
    ) -> PluginResult<()>;
}

/// reqwest-backed tarball fetcher with streaming size enforcement.
pub struct HttpTarballFetcher {
    client: reqwest::Client,
    max_size: u64,
}

impl HttpTarballFetcher {
    /// Create a fetcher with default timeouts and size limit.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::RegistryError` if the HTTP client cannot be
    /// built (e.g. TLS backend unavailable).
    pub fn new() -> PluginResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .user_agent(concat!("basalt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PluginError::RegistryError {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            max_size: DEFAULT_MAX_SIZE,
        })
    }

    /// Override the maximum tarball size in bytes.
    #[must_use]
    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    async fn download(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> PluginResult<Vec<u8>> {
        debug!(url = %url, "downloading tarball");

        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|e| PluginError::RegistryError {
            message: format!("failed to download tarball: {e}"),
        })?;

        if !response.status().is_success() {
            return Err(PluginError::RegistryError {
                message: format!("tarball download failed with status {}", response.status()),
            });
        }

        if let Some(content_length) = response.content_length()
            && content_length > self.max_size
        {
            return Err(PluginError::PackageTooLarge {
                size: content_length,
                limit: self.max_size,
            });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();
        let mut downloaded = 0u64;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| PluginError::RegistryError {
                message: format!("failed to read tarball body: {e}"),
            })?;

            downloaded = downloaded.saturating_add(chunk.len() as u64);
            if downloaded > self.max_size {
                return Err(PluginError::PackageTooLarge {
                    size: downloaded,
                    limit: self.max_size,
                });
            }

            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer)
    }
}

#[async_trait]
impl TarballFetcher for HttpTarballFetcher {
    async fn fetch(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        dest: &Path,
    ) -> PluginResult<()> {
        let data = self.download(url, headers).await?;
        debug!(dest = %dest.display(), bytes = data.len(), "unpacking tarball");
        extract::unpack_archive(&data, dest)
    }
}
