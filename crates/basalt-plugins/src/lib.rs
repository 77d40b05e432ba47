//! npm plugin ingestion for the Basalt application platform.
//!
//! Given a URL pointing at an npm package — either the human-facing package
//! page or a registry tarball — this crate validates the URL's origin against
//! an allow-list, resolves it to a concrete tarball through the npm registry,
//! downloads and unpacks it, and reads the plugin's metadata (`package.json`
//! plus `schema.json`).
//!
//! The pipeline is strictly linear: origin check → resolution → download →
//! extraction → metadata. Every failure aborts the whole ingestion; there is
//! no partial success. The origin allow-list is a security boundary — it is
//! what prevents arbitrary remote code from being fetched and unpacked.
//!
//! Entry point: [`NpmIngester::ingest`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod extract;
pub mod fetch;
pub mod fsutil;
pub mod ingest;
pub mod metadata;
pub mod registry;
pub mod source;

pub use error::{PluginError, PluginResult};
pub use fetch::{HttpTarballFetcher, TarballFetcher};
pub use ingest::NpmIngester;
pub use metadata::{PackageJson, PluginMetadata, read_plugin_metadata};
pub use registry::{DistInfo, PackageMetadata, VersionMetadata};
pub use source::{DEFAULT_REGISTRY, NPM_PACKAGE_PAGE, PackagePath};
