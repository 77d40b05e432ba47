//! Plugin metadata read from an unpacked package directory.
//!
//! A Basalt plugin ships two documents at its root: `package.json` (npm
//! identity) and `schema.json` (what the plugin contributes to the platform,
//! with a top-level `type` such as `component` or `datasource`).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{PluginError, PluginResult};

/// Parsed `package.json` fields the platform cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageJson {
    /// Package name.
    pub name: String,
    /// Version string.
    pub version: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Optional license identifier.
    #[serde(default)]
    pub license: Option<String>,
}

/// Metadata describing an ingested plugin.
#[derive(Debug, Clone)]
pub struct PluginMetadata {
    /// Directory the plugin was unpacked into.
    pub directory: PathBuf,
    /// Parsed `package.json`.
    pub package: PackageJson,
    /// Raw `schema.json` document.
    pub schema: serde_json::Value,
    /// Plugin kind declared by the schema (e.g. `component`, `datasource`).
    pub kind: String,
}

/// Read plugin metadata from an unpacked directory.
///
/// Requires `package.json` and `schema.json` at the directory root; the
/// schema must declare a string `type`.
///
/// # Errors
///
/// Returns `PluginError::MetadataError` when either file is missing or
/// malformed, or when the schema lacks a plugin type.
pub fn read_plugin_metadata(dir: &Path) -> PluginResult<PluginMetadata> {
    let package: PackageJson = read_json(dir, "package.json")?;
    let schema: serde_json::Value = read_json(dir, "schema.json")?;

    let kind = schema
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| PluginError::MetadataError {
            dir: dir.to_path_buf(),
            message: "schema.json does not declare a plugin type".into(),
        })?
        .to_string();

    Ok(PluginMetadata {
        directory: dir.to_path_buf(),
        package,
        schema,
        kind,
    })
}

fn read_json<T: DeserializeOwned>(dir: &Path, name: &str) -> PluginResult<T> {
    let path = dir.join(name);
    let raw = std::fs::read_to_string(&path).map_err(|e| PluginError::MetadataError {
        dir: dir.to_path_buf(),
        message: format!("{name} not found: {e}"),
    })?;
    serde_json::from_str(&raw).map_err(|e| PluginError::MetadataError {
        dir: dir.to_path_buf(),
        message: format!("{name} is malformed: {e}"),
    })
}
