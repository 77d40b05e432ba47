//! Serde types for npm registry package documents.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{PluginError, PluginResult};

/// Top-level registry document for a package.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageMetadata {
    /// Package name.
    #[serde(default)]
    pub name: Option<String>,
    /// Dist-tag to version mapping (e.g. `{"latest": "1.0.0"}`).
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: HashMap<String, String>,
    /// Per-version metadata keyed by version string.
    #[serde(default)]
    pub versions: HashMap<String, VersionMetadata>,
}

/// Metadata for a single published version.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionMetadata {
    /// Version string.
    #[serde(default)]
    pub version: String,
    /// Distribution info (tarball URL).
    #[serde(default)]
    pub dist: Option<DistInfo>,
}

/// Distribution information for a published version.
#[derive(Debug, Clone, Deserialize)]
pub struct DistInfo {
    /// Tarball download URL.
    #[serde(default)]
    pub tarball: Option<String>,
}

impl PackageMetadata {
    /// The package name, or a descriptive error when the document lacks one.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::RegistryError` if the document has no name.
    pub fn require_name(&self) -> PluginResult<&str> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PluginError::RegistryError {
                message: "package name not found in registry response".into(),
            })
    }

    /// Resolve the `latest` dist-tag to that version's tarball URL.
    ///
    /// Returns the resolved version string and tarball URL.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::RegistryError` when the `latest` dist-tag, the
    /// tagged version, or its tarball URL is missing from the document.
    pub fn latest_tarball(&self) -> PluginResult<(&str, &str)> {
        let latest =
            self.dist_tags
                .get("latest")
                .ok_or_else(|| PluginError::RegistryError {
                    message: "latest version not found in registry response".into(),
                })?;

        let version = self
            .versions
            .get(latest)
            .ok_or_else(|| PluginError::RegistryError {
                message: format!("version {latest} not found in registry response"),
            })?;

        let tarball = version
            .dist
            .as_ref()
            .and_then(|dist| dist.tarball.as_deref())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PluginError::RegistryError {
                message: "tarball url not found".into(),
            })?;

        Ok((latest.as_str(), tarball))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_latest_tarball() {
        let json = r#"{
            "name": "basalt-plugin-bar-chart",
            "dist-tags": { "latest": "1.2.0" },
            "versions": {
                "1.2.0": {
                    "version": "1.2.0",
                    "dist": {
                        "tarball": "https://registry.npmjs.org/basalt-plugin-bar-chart/-/basalt-plugin-bar-chart-1.2.0.tgz"
                    }
                }
            }
        }"#;

        let meta: PackageMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.require_name().unwrap(), "basalt-plugin-bar-chart");

        let (version, tarball) = meta.latest_tarball().unwrap();
        assert_eq!(version, "1.2.0");
        assert!(tarball.ends_with("bar-chart-1.2.0.tgz"));
    }

    #[test]
    fn missing_latest_tag() {
        let json = r#"{ "name": "pkg", "dist-tags": {}, "versions": {} }"#;
        let meta: PackageMetadata = serde_json::from_str(json).unwrap();
        let err = meta.latest_tarball().unwrap_err();
        assert!(err.to_string().contains("latest version not found"));
    }

    #[test]
    fn missing_tagged_version() {
        let json = r#"{ "name": "pkg", "dist-tags": { "latest": "2.0.0" }, "versions": {} }"#;
        let meta: PackageMetadata = serde_json::from_str(json).unwrap();
        let err = meta.latest_tarball().unwrap_err();
        assert!(err.to_string().contains("version 2.0.0 not found"));
    }

    #[test]
    fn missing_tarball_url() {
        let json = r#"{
            "name": "pkg",
            "dist-tags": { "latest": "1.0.0" },
            "versions": { "1.0.0": { "version": "1.0.0" } }
        }"#;
        let meta: PackageMetadata = serde_json::from_str(json).unwrap();
        let err = meta.latest_tarball().unwrap_err();
        assert!(err.to_string().contains("tarball url not found"));
    }

    #[test]
    fn missing_name() {
        let json = r#"{ "dist-tags": {}, "versions": {} }"#;
        let meta: PackageMetadata = serde_json::from_str(json).unwrap();
        let err = meta.require_name().unwrap_err();
        assert!(err.to_string().contains("package name not found"));
    }
}
