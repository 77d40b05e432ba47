//! The ingestion pipeline: origin check → resolution → download → metadata.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{PluginError, PluginResult};
use crate::fetch::{HttpTarballFetcher, TarballFetcher};
use crate::metadata::{self, PluginMetadata};
use crate::registry::PackageMetadata;
use crate::source::{self, PackagePath, TARBALL_EXTENSION};
use crate::{extract, fsutil};

/// Registry metadata request timeout.
const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Suffix of the nested plugin archive inside an unpacked npm package.
const NESTED_ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Ingests npm plugins: validates the source URL, resolves it to a tarball,
/// downloads and unpacks it, and reads the plugin metadata.
pub struct NpmIngester<F = HttpTarballFetcher> {
    client: reqwest::Client,
    fetcher: F,
    registry_url: String,
}

impl NpmIngester<HttpTarballFetcher> {
    /// Create an ingester against the public npm registry.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::RegistryError` if an HTTP client cannot be
    /// built.
    pub fn new() -> PluginResult<Self> {
        Self::with_fetcher(HttpTarballFetcher::new()?)
    }
}

impl<F: TarballFetcher> NpmIngester<F> {
    /// Create an ingester with a custom tarball fetcher.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::RegistryError` if an HTTP client cannot be
    /// built.
    pub fn with_fetcher(fetcher: F) -> PluginResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(METADATA_TIMEOUT)
            .user_agent(concat!("basalt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PluginError::RegistryError {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            fetcher,
            registry_url: source::DEFAULT_REGISTRY.to_string(),
        })
    }

    /// Override the registry root (private registries, tests).
    ///
    /// The registry root also anchors the origin allow-list: direct tarball
    /// links must start with it.
    #[must_use]
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Run the full ingestion pipeline for `url`, unpacking into `work_dir`.
    ///
    /// `headers` are forwarded to the tarball download only (private
    /// registries, auth). `work_dir` must exist; collision avoidance between
    /// concurrent ingestions is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Every pipeline stage failure aborts the ingestion: invalid origin,
    /// unresolvable package, download or extraction failure, or missing
    /// plugin metadata.
    pub async fn ingest(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        work_dir: &Path,
    ) -> PluginResult<PluginMetadata> {
        source::validate_origin(url, &self.registry_url)?;

        let tarball_url = if url.ends_with(TARBALL_EXTENSION) {
            debug!(url = %url, "direct tarball link, skipping registry resolution");
            url.to_string()
        } else {
            self.resolve_tarball_url(url).await?
        };

        self.fetcher.fetch(&tarball_url, headers, work_dir).await?;

        let archive = fsutil::find_file_rec(work_dir, NESTED_ARCHIVE_SUFFIX).ok_or_else(|| {
            PluginError::TarballFileNotFound {
                dir: work_dir.to_path_buf(),
            }
        })?;

        debug!(archive = %archive.display(), "unpacking nested plugin archive");
        extract::unpack_archive_file(&archive, work_dir).map_err(|e| {
            PluginError::ExtractionError {
                message: format!("failed to unpack {}: {e}", archive.display()),
            }
        })?;

        // The intermediate npm `package` directory is redundant once the
        // nested archive has been unpacked at the root.
        let package_dir = work_dir.join("package");
        if package_dir.is_dir() {
            tokio::fs::remove_dir_all(&package_dir).await?;
        }

        let meta = metadata::read_plugin_metadata(work_dir)?;
        info!(
            plugin = %meta.package.name,
            version = %meta.package.version,
            kind = %meta.kind,
            "plugin ingested"
        );
        Ok(meta)
    }

    /// Resolve a package page URL to its latest tarball URL via the registry.
    async fn resolve_tarball_url(&self, url: &str) -> PluginResult<String> {
        let path = PackagePath::from_url(url)?;
        let request_url = format!("{}/{}", self.registry_url, path.registry_path());
        debug!(url = %request_url, "resolving package through the registry");

        let response =
            self.client
                .get(&request_url)
                .send()
                .await
                .map_err(|e| PluginError::RegistryError {
                    message: format!("failed to reach registry: {e}"),
                })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(PluginError::PackageNotFound {
                status: response.status().as_u16(),
                package: path.full_name(),
            });
        }

        let doc: PackageMetadata =
            response
                .json()
                .await
                .map_err(|e| PluginError::RegistryError {
                    message: format!("failed to parse registry response: {e}"),
                })?;

        let name = doc.require_name()?;
        let (version, tarball) = doc.latest_tarball()?;
        info!(package = %name, version = %version, "resolved plugin tarball");
        Ok(tarball.to_string())
    }
}
