//! OpenAPI response conformance checking.
//!
//! Validates public-API responses against a pre-loaded OpenAPI document.
//! The route and status must be documented, and the response body must
//! satisfy the JSON schema of the `application/json` content. In-document
//! `$ref`s are inlined before the schema is compiled with `jsonschema`, so
//! `#/components/schemas/...` references work without a resolver.

use std::path::Path;

use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};

/// Maximum `$ref` nesting when inlining. Cyclic references are a document
/// bug and reported as such.
const MAX_REF_DEPTH: usize = 32;

/// A pre-loaded OpenAPI document.
#[derive(Debug, Clone)]
pub struct OpenApiSpec {
    document: Value,
}

impl OpenApiSpec {
    /// Load a document from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::SpecError` if the string is not valid JSON.
    pub fn from_json(raw: &str) -> HarnessResult<Self> {
        let document = serde_json::from_str(raw).map_err(|e| HarnessError::SpecError {
            message: format!("invalid JSON document: {e}"),
        })?;
        Ok(Self { document })
    }

    /// Load a document from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::SpecError` if the string is not valid YAML.
    pub fn from_yaml(raw: &str) -> HarnessResult<Self> {
        let document = serde_yaml::from_str(raw).map_err(|e| HarnessError::SpecError {
            message: format!("invalid YAML document: {e}"),
        })?;
        Ok(Self { document })
    }

    /// Load a document from a `.json`, `.yaml`, or `.yml` file.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::SpecError` if the file cannot be read or
    /// parsed.
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| HarnessError::SpecError {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&raw),
            _ => Self::from_json(&raw),
        }
    }

    /// Validate a response body against the documented schema.
    ///
    /// `path` is the route relative to the public prefix, matched against
    /// the document's path templates (`{param}` segments match anything).
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Undocumented` when the route, operation, or
    /// status has no entry in the document, and
    /// `HarnessError::SchemaViolation` when the body does not satisfy the
    /// documented schema.
    pub fn validate_response(
        &self,
        method: &str,
        path: &str,
        status: u16,
        body: &Value,
    ) -> HarnessResult<()> {
        let Some(schema) = self.response_schema(method, path, status)? else {
            // Documented response without JSON content: nothing to check.
            return Ok(());
        };

        let schema = resolve_refs(&self.document, &schema, 0)?;
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| HarnessError::SpecError {
                message: format!("failed to compile response schema: {e}"),
            })?;

        let violations: Vec<String> = validator
            .iter_errors(body)
            .map(|e| format!("{e} (at {})", e.instance_path))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::SchemaViolation {
                method: method.to_string(),
                path: path.to_string(),
                status,
                violations: violations.join("; "),
            })
        }
    }

    /// Locate the JSON response schema for an operation, if any.
    fn response_schema(
        &self,
        method: &str,
        path: &str,
        status: u16,
    ) -> HarnessResult<Option<Value>> {
        let undocumented = |missing: &str| HarnessError::Undocumented {
            missing: missing.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            status,
        };

        let paths = self
            .document
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| HarnessError::SpecError {
                message: "document has no paths object".into(),
            })?;

        let item = paths
            .iter()
            .find(|(template, _)| path_matches(template, path))
            .map(|(_, item)| item)
            .ok_or_else(|| undocumented("path"))?;

        let operation = item
            .get(method.to_ascii_lowercase())
            .ok_or_else(|| undocumented("operation"))?;

        let responses = operation
            .get("responses")
            .and_then(Value::as_object)
            .ok_or_else(|| undocumented("responses"))?;

        let response = responses
            .get(&status.to_string())
            .or_else(|| responses.get("default"))
            .ok_or_else(|| undocumented("response"))?;

        let response = deref(&self.document, response)?;
        Ok(response
            .pointer("/content/application~1json/schema")
            .cloned())
    }
}

/// Match a concrete request path against an OpenAPI path template.
///
/// Segment counts must agree; a `{param}` template segment matches any
/// non-empty concrete segment.
fn path_matches(template: &str, path: &str) -> bool {
    let template_segments: Vec<&str> = template.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    template_segments.len() == path_segments.len()
        && template_segments
            .iter()
            .zip(&path_segments)
            .all(|(tpl, actual)| {
                (tpl.starts_with('{') && tpl.ends_with('}') && !actual.is_empty()) || tpl == actual
            })
}

/// Follow a single `$ref` to its in-document target, if the node is one.
fn deref<'a>(document: &'a Value, node: &'a Value) -> HarnessResult<&'a Value> {
    let Some(reference) = node.get("$ref").and_then(Value::as_str) else {
        return Ok(node);
    };
    lookup_ref(document, reference)
}

fn lookup_ref<'a>(document: &'a Value, reference: &str) -> HarnessResult<&'a Value> {
    let pointer = reference
        .strip_prefix('#')
        .ok_or_else(|| HarnessError::SpecError {
            message: format!("unsupported external $ref: {reference}"),
        })?;
    document
        .pointer(pointer)
        .ok_or_else(|| HarnessError::SpecError {
            message: format!("unresolved $ref: {reference}"),
        })
}

/// Inline in-document `$ref`s so an extracted schema can be compiled alone.
fn resolve_refs(document: &Value, node: &Value, depth: usize) -> HarnessResult<Value> {
    if depth > MAX_REF_DEPTH {
        return Err(HarnessError::SpecError {
            message: format!("$ref nesting exceeds {MAX_REF_DEPTH} (cyclic reference?)"),
        });
    }

    match node {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref").and_then(Value::as_str) {
                let target = lookup_ref(document, reference)?;
                return resolve_refs(document, target, depth.saturating_add(1));
            }
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(
                    key.clone(),
                    resolve_refs(document, value, depth.saturating_add(1))?,
                );
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let resolved: Result<Vec<_>, _> = items
                .iter()
                .map(|item| resolve_refs(document, item, depth.saturating_add(1)))
                .collect();
            Ok(Value::Array(resolved?))
        }
        other => Ok(other.clone()),
    }
}
