//! Tarball extraction with path traversal protection.
//!
//! Unpacks gzip-compressed tar archives while guarding against:
//! - Path traversal (`..` components, absolute paths)
//! - Unsafe entry types (symlinks, hardlinks, device nodes)
//! - Excessive entry counts and claimed sizes (archive bombs)
//!
//! Entry paths are preserved as-is. npm archives keep their leading
//! `package/` directory; the ingest pipeline relies on that directory
//! surviving extraction so it can delete it afterwards.

use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{PluginError, PluginResult};

/// Maximum number of entries allowed in an archive.
const MAX_ENTRIES: usize = 10_000;

/// Maximum cumulative extracted size (500 MB).
const MAX_TOTAL_SIZE: u64 = 500 * 1024 * 1024;

/// Unpack a gzip-compressed tarball held in memory into `dest`.
///
/// # Errors
///
/// Returns `PluginError::ExtractionError` on decompression or archive
/// failures, `PluginError::PathTraversal` on malicious entry paths, and
/// `PluginError::UnsafeEntryType` for entries that are not plain files or
/// directories.
pub fn unpack_archive(data: &[u8], dest: &Path) -> PluginResult<()> {
    unpack(GzDecoder::new(data), dest)
}

/// Unpack a gzip-compressed tarball file on disk into `dest`.
///
/// # Errors
///
/// Same failure modes as [`unpack_archive`], plus an I/O error when the
/// archive file cannot be opened.
pub fn unpack_archive_file(file: &Path, dest: &Path) -> PluginResult<()> {
    let reader = std::fs::File::open(file)?;
    unpack(GzDecoder::new(reader), dest)
}

fn unpack<R: Read>(decoder: GzDecoder<R>, dest: &Path) -> PluginResult<()> {
    let mut archive = Archive::new(decoder);

    let dest = dest
        .canonicalize()
        .map_err(|e| PluginError::ExtractionError {
            message: format!("failed to canonicalize destination: {e}"),
        })?;

    let mut entry_count = 0usize;
    let mut total_size = 0u64;

    let entries = archive
        .entries()
        .map_err(|e| PluginError::ExtractionError {
            message: format!("failed to read archive entries: {e}"),
        })?;

    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| PluginError::ExtractionError {
            message: format!("failed to read archive entry: {e}"),
        })?;

        entry_count = entry_count.saturating_add(1);
        if entry_count > MAX_ENTRIES {
            return Err(PluginError::ExtractionError {
                message: format!("archive exceeds maximum entry count ({MAX_ENTRIES})"),
            });
        }

        let entry_type = entry.header().entry_type();
        if !is_safe_entry_type(entry_type) {
            let entry_path = entry
                .path()
                .map_or_else(|_| "<unknown>".to_string(), |p| p.display().to_string());
            return Err(PluginError::UnsafeEntryType {
                entry_type: format!("{entry_type:?}"),
                path: entry_path,
            });
        }

        let claimed = entry
            .header()
            .size()
            .map_err(|e| PluginError::ExtractionError {
                message: format!("failed to read entry size: {e}"),
            })?;
        total_size = total_size.saturating_add(claimed);
        if total_size > MAX_TOTAL_SIZE {
            return Err(PluginError::ExtractionError {
                message: format!("archive exceeds maximum extracted size ({MAX_TOTAL_SIZE} bytes)"),
            });
        }

        let entry_path = entry
            .path()
            .map_err(|e| PluginError::ExtractionError {
                message: format!("failed to read entry path: {e}"),
            })?
            .into_owned();

        validate_entry_path(&entry_path)?;

        // Symlink entries are rejected above, so a lexical containment
        // check on the joined path is sufficient here.
        let target = dest.join(&entry_path);
        if !target.starts_with(&dest) {
            return Err(PluginError::PathTraversal {
                path: entry_path.display().to_string(),
            });
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PluginError::ExtractionError {
                message: format!("failed to create directory {}: {e}", parent.display()),
            })?;
        }

        entry
            .unpack(&target)
            .map_err(|e| PluginError::ExtractionError {
                message: format!("failed to unpack {}: {e}", entry_path.display()),
            })?;
    }

    if entry_count == 0 {
        return Err(PluginError::ExtractionError {
            message: "archive is empty".into(),
        });
    }

    Ok(())
}

/// Whether a tar entry type is safe to extract.
///
/// Allows regular files, directories, and metadata headers. Rejects
/// symlinks, hardlinks, devices, FIFOs, and sparse entries — none of which
/// belong in an npm package.
fn is_safe_entry_type(entry_type: tar::EntryType) -> bool {
    matches!(
        entry_type,
        tar::EntryType::Regular
            | tar::EntryType::Directory
            | tar::EntryType::GNULongName
            | tar::EntryType::XHeader
            | tar::EntryType::XGlobalHeader
    )
}

/// Validate that an entry path has no traversal components.
fn validate_entry_path(path: &Path) -> PluginResult<()> {
    if path.is_absolute() {
        return Err(PluginError::PathTraversal {
            path: path.display().to_string(),
        });
    }

    for component in path.components() {
        if matches!(
            component,
            std::path::Component::ParentDir
                | std::path::Component::Prefix(_)
                | std::path::Component::RootDir
        ) {
            return Err(PluginError::PathTraversal {
                path: path.display().to_string(),
            });
        }
    }

    Ok(())
}
