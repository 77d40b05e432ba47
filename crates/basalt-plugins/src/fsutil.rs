//! Filesystem helpers for unpacked plugin directories.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Find the first file under `dir` whose name ends with `suffix`.
///
/// The search is recursive and depth-first; unreadable entries are skipped.
#[must_use]
pub fn find_file_rec(dir: &Path, suffix: &str) -> Option<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| {
            entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(suffix)
        })
        .map(walkdir::DirEntry::into_path)
}
