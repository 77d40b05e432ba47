//! Ingestion error types.

use std::path::PathBuf;

/// Errors from plugin ingestion.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The plugin URL does not start with an allow-listed origin.
    #[error("invalid origin: {url}")]
    InvalidOrigin {
        /// The rejected URL.
        url: String,
    },

    /// The registry path derived from the URL is not a valid npm package path.
    #[error("invalid package path '{path}': {reason}")]
    InvalidPackagePath {
        /// The rejected path.
        path: String,
        /// Why the path is invalid.
        reason: String,
    },

    /// The registry returned a non-200 response for the package.
    #[error("package not found: registry returned {status} for {package}")]
    PackageNotFound {
        /// HTTP status returned by the registry.
        status: u16,
        /// The package that was requested.
        package: String,
    },

    /// npm registry API failure or a malformed registry response.
    #[error("registry error: {message}")]
    RegistryError {
        /// Description of the registry failure.
        message: String,
    },

    /// No `.tar.gz` archive was found after downloading and unpacking.
    #[error("tarball plugin file not found in {}", dir.display())]
    TarballFileNotFound {
        /// Directory that was searched.
        dir: PathBuf,
    },

    /// Tarball extraction failure.
    #[error("extraction error: {message}")]
    ExtractionError {
        /// Description of the extraction failure.
        message: String,
    },

    /// Path traversal detected in an archive entry.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path.
        path: String,
    },

    /// Unsafe entry type in an archive (symlink, hardlink, device node...).
    #[error("unsafe archive entry type '{entry_type}' at {path}")]
    UnsafeEntryType {
        /// The entry type that was rejected.
        entry_type: String,
        /// The path of the entry.
        path: String,
    },

    /// Tarball exceeds the maximum allowed size.
    #[error("package too large: {size} bytes (limit: {limit} bytes)")]
    PackageTooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        limit: u64,
    },

    /// A required metadata file is missing or malformed.
    #[error("plugin metadata error in {}: {message}", dir.display())]
    MetadataError {
        /// The unpacked plugin directory.
        dir: PathBuf,
        /// What was missing or malformed.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ingestion operations.
pub type PluginResult<T> = Result<T, PluginError>;
