//! Plugin source URL validation.
//!
//! Two origins are allow-listed: npm's human-facing package page and the
//! registry root (configurable for private registries). A URL from the
//! package page is reduced to its registry path by dropping the leading
//! site segment; the remainder must then parse as a valid npm package path
//! (`name` or `@scope/name`). That second check is itself an allow-list —
//! it blocks path traversal and unexpected registry sub-resources before
//! any registry call is made.

use crate::error::{PluginError, PluginResult};

/// npm's human-facing package page prefix.
pub const NPM_PACKAGE_PAGE: &str = "https://www.npmjs.com/package/";

/// Default public registry root.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// File extension marking a direct tarball link.
pub const TARBALL_EXTENSION: &str = ".tgz";

/// Maximum npm package name length (scope + name combined).
const MAX_PACKAGE_NAME_LENGTH: usize = 214;

/// Check a plugin URL against the allow-listed origins.
///
/// # Errors
///
/// Returns `PluginError::InvalidOrigin` if the URL starts with neither the
/// npm package page nor the configured registry root.
pub fn validate_origin(url: &str, registry_url: &str) -> PluginResult<()> {
    if url.starts_with(NPM_PACKAGE_PAGE) || matches_root(url, registry_url) {
        return Ok(());
    }
    Err(PluginError::InvalidOrigin {
        url: url.to_string(),
    })
}

/// A URL matches the registry root only at a path boundary. A bare prefix
/// check would let a lookalike host (`registry.npmjs.org.evil.com`) through.
fn matches_root(url: &str, root: &str) -> bool {
    let root = root.trim_end_matches('/');
    url == root
        || url
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// A validated npm package path (`name` or `@scope/name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePath {
    /// Optional scope (without the `@` prefix).
    pub scope: Option<String>,
    /// Package name (without scope).
    pub name: String,
}

impl PackagePath {
    /// Extract the package path from a plugin URL.
    ///
    /// The first path segment (`package` on the npm site) is dropped; the
    /// remaining segments must form a valid npm package path.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::InvalidPackagePath` if the URL cannot be parsed
    /// or the remainder is not a valid package path.
    pub fn from_url(url: &str) -> PluginResult<Self> {
        let parsed = url::Url::parse(url).map_err(|e| PluginError::InvalidPackagePath {
            path: url.to_string(),
            reason: format!("not a valid URL: {e}"),
        })?;

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        if segments.len() < 2 {
            return Err(PluginError::InvalidPackagePath {
                path: parsed.path().to_string(),
                reason: "no package path after the site prefix".into(),
            });
        }

        Self::parse(&segments[1..].join("/"))
    }

    /// Parse and validate `name` or `@scope/name`.
    ///
    /// Components must follow npm naming rules: lowercase, matching
    /// `[a-z0-9][a-z0-9._-]*`, with the combined length at most 214
    /// characters.
    ///
    /// # Errors
    ///
    /// Returns `PluginError::InvalidPackagePath` on any rule violation.
    pub fn parse(path: &str) -> PluginResult<Self> {
        let invalid = |reason: String| PluginError::InvalidPackagePath {
            path: path.to_string(),
            reason,
        };

        let parsed = if let Some(rest) = path.strip_prefix('@') {
            let (scope, name) = rest
                .split_once('/')
                .ok_or_else(|| invalid("scoped path must be '@scope/name'".into()))?;
            if name.contains('/') {
                return Err(invalid("unexpected extra path segments".into()));
            }
            Self {
                scope: Some(scope.to_string()),
                name: name.to_string(),
            }
        } else {
            if path.contains('/') {
                return Err(invalid("unexpected extra path segments".into()));
            }
            Self {
                scope: None,
                name: path.to_string(),
            }
        };

        if parsed.full_name().len() > MAX_PACKAGE_NAME_LENGTH {
            return Err(invalid(format!(
                "exceeds maximum length of {MAX_PACKAGE_NAME_LENGTH} characters"
            )));
        }
        if let Some(scope) = &parsed.scope {
            validate_name_component(scope, "scope").map_err(|reason| invalid(reason))?;
        }
        validate_name_component(&parsed.name, "name").map_err(|reason| invalid(reason))?;

        Ok(parsed)
    }

    /// Full package name including scope (`@scope/name` or `name`).
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{scope}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// URL-encoded path for registry API calls.
    ///
    /// Scoped packages use `@scope%2Fname`, unscoped use `name`.
    #[must_use]
    pub fn registry_path(&self) -> String {
        match &self.scope {
            Some(scope) => format!("@{}%2F{}", percent_encode(scope), percent_encode(&self.name)),
            None => percent_encode(&self.name),
        }
    }
}

impl std::fmt::Display for PackagePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Validate a single name component (scope or package name) against npm
/// rules: lowercase only, starting with an alphanumeric character.
fn validate_name_component(component: &str, kind: &str) -> Result<(), String> {
    let mut chars = component.chars();
    let Some(first) = chars.next() else {
        return Err(format!("{kind} cannot be empty"));
    };

    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return Err(format!(
            "{kind} must start with a lowercase letter or digit"
        ));
    }

    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '.' && c != '_' && c != '-' {
            return Err(format!(
                "{kind} contains invalid character '{c}' (allowed: a-z, 0-9, '.', '_', '-')"
            ));
        }
    }

    Ok(())
}

/// Percent-encode a URL path component (defense-in-depth after validation).
fn percent_encode(s: &str) -> String {
    use std::fmt::Write;

    let mut encoded = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_allows_package_page() {
        validate_origin(
            "https://www.npmjs.com/package/basalt-plugin-bar-chart",
            DEFAULT_REGISTRY,
        )
        .unwrap();
    }

    #[test]
    fn origin_allows_registry_root() {
        validate_origin(
            "https://registry.npmjs.org/pkg/-/pkg-1.0.0.tgz",
            DEFAULT_REGISTRY,
        )
        .unwrap();
    }

    #[test]
    fn origin_rejects_unknown_host() {
        let err = validate_origin("https://evil.com/package/pkg", DEFAULT_REGISTRY).unwrap_err();
        assert!(err.to_string().contains("invalid origin"));
    }

    #[test]
    fn origin_rejects_lookalike_host() {
        let err = validate_origin(
            "https://registry.npmjs.org.evil.com/pkg",
            DEFAULT_REGISTRY,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid origin"));
    }

    #[test]
    fn origin_rejects_lookalike_host_with_tarball_link() {
        // A direct tarball link skips registry resolution, so the origin
        // check is the only guard on this path.
        let err = validate_origin(
            "https://registry.npmjs.org.evil.com/p-1.0.0.tgz",
            DEFAULT_REGISTRY,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid origin"));
    }

    #[test]
    fn origin_allows_exact_registry_root() {
        validate_origin("https://registry.npmjs.org", DEFAULT_REGISTRY).unwrap();
    }

    #[test]
    fn origin_matches_trailing_slash_registry_config() {
        validate_origin(
            "https://registry.npmjs.org/pkg/-/pkg-1.0.0.tgz",
            "https://registry.npmjs.org/",
        )
        .unwrap();
        let err = validate_origin(
            "https://registry.npmjs.org.evil.com/pkg",
            "https://registry.npmjs.org/",
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid origin"));
    }

    #[test]
    fn origin_rejects_plain_http() {
        let err =
            validate_origin("http://registry.npmjs.org/pkg", DEFAULT_REGISTRY).unwrap_err();
        assert!(err.to_string().contains("invalid origin"));
    }

    #[test]
    fn from_url_unscoped() {
        let path =
            PackagePath::from_url("https://www.npmjs.com/package/basalt-plugin-bar-chart")
                .unwrap();
        assert_eq!(path.scope, None);
        assert_eq!(path.name, "basalt-plugin-bar-chart");
        assert_eq!(path.registry_path(), "basalt-plugin-bar-chart");
    }

    #[test]
    fn from_url_scoped() {
        let path = PackagePath::from_url("https://www.npmjs.com/package/@acme/bar-chart").unwrap();
        assert_eq!(path.scope.as_deref(), Some("acme"));
        assert_eq!(path.name, "bar-chart");
        assert_eq!(path.full_name(), "@acme/bar-chart");
        assert_eq!(path.registry_path(), "@acme%2Fbar-chart");
    }

    #[test]
    fn from_url_rejects_bare_prefix() {
        let err = PackagePath::from_url("https://www.npmjs.com/package").unwrap_err();
        assert!(err.to_string().contains("no package path"));
    }

    #[test]
    fn parse_rejects_extra_segments() {
        let err = PackagePath::parse("@acme/bar-chart/v/1.2.3").unwrap_err();
        assert!(err.to_string().contains("extra path segments"));
    }

    #[test]
    fn parse_rejects_traversal() {
        assert!(PackagePath::parse("../../../etc/passwd").is_err());
        assert!(PackagePath::parse("..").is_err());
    }

    #[test]
    fn parse_rejects_uppercase() {
        let err = PackagePath::parse("Bar-Chart").unwrap_err();
        assert!(err.to_string().contains("lowercase"));
    }

    #[test]
    fn parse_rejects_empty_scope() {
        assert!(PackagePath::parse("@/name").is_err());
    }

    #[test]
    fn parse_rejects_overlong_name() {
        let long = "a".repeat(MAX_PACKAGE_NAME_LENGTH.saturating_add(1));
        let err = PackagePath::parse(&long).unwrap_err();
        assert!(err.to_string().contains("maximum length"));
    }

    #[test]
    fn valid_names_accepted() {
        PackagePath::parse("my-pkg").unwrap();
        PackagePath::parse("my_pkg.v2").unwrap();
        PackagePath::parse("0leading-digit").unwrap();
        PackagePath::parse("@my-scope/my-pkg").unwrap();
    }

    #[test]
    fn display_matches_full_name() {
        let path = PackagePath::parse("@acme/bar-chart").unwrap();
        assert_eq!(path.to_string(), "@acme/bar-chart");
    }
}
