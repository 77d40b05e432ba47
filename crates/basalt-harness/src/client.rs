//! The request/assert client.
//!
//! [`TestClient`] wraps a single application server, identified by an
//! explicit base URL. Each call builds the request from a [`RequestOpts`],
//! sends it with a bounded retry on connection reset, then checks the
//! response against the declared expectations before handing back the
//! parsed body.

use std::error::Error as _;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, Response};
use serde_json::Value;
use tracing::debug;

use crate::auth::AuthProvider;
use crate::error::{HarnessError, HarnessResult};
use crate::headers::{HEADER_INCLUDE_STACKTRACE, PUBLIC_API_PREFIX};
use crate::openapi::OpenApiSpec;
use crate::opts::{Attachment, Expectations, RequestOpts};

/// Total send attempts for one call. Only connection resets are retried,
/// so resets on the first two attempts are absorbed and a reset on the
/// last one propagates.
const MAX_ATTEMPTS: u32 = 3;

/// Connect timeout for the underlying client.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A client bound to one application server.
pub struct TestClient {
    client: reqwest::Client,
    base_url: String,
    prefix: &'static str,
    auth: Arc<dyn AuthProvider>,
    openapi: Option<OpenApiSpec>,
}

impl TestClient {
    /// Client for the default API variant: requests go to `base_url`
    /// directly and no conformance checking is done.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized.
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Self {
        Self::build(base_url.into(), "", auth, None)
    }

    /// Client for the public API variant: paths are prefixed with
    /// [`PUBLIC_API_PREFIX`] and every 2xx response is validated against
    /// `openapi`.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized.
    #[must_use]
    pub fn public(
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
        openapi: OpenApiSpec,
    ) -> Self {
        Self::build(base_url.into(), PUBLIC_API_PREFIX, auth, Some(openapi))
    }

    fn build(
        base_url: String,
        prefix: &'static str,
        auth: Arc<dyn AuthProvider>,
        openapi: Option<OpenApiSpec>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            prefix,
            auth,
            openapi,
        }
    }

    /// Send a GET request and check the response.
    ///
    /// # Errors
    ///
    /// See [`TestClient::request`].
    pub async fn get(&self, path: &str, opts: RequestOpts) -> HarnessResult<Value> {
        self.request(Method::GET, path, opts).await
    }

    /// Send a POST request and check the response.
    ///
    /// # Errors
    ///
    /// See [`TestClient::request`].
    pub async fn post(&self, path: &str, opts: RequestOpts) -> HarnessResult<Value> {
        self.request(Method::POST, path, opts).await
    }

    /// Send a PUT request and check the response.
    ///
    /// # Errors
    ///
    /// See [`TestClient::request`].
    pub async fn put(&self, path: &str, opts: RequestOpts) -> HarnessResult<Value> {
        self.request(Method::PUT, path, opts).await
    }

    /// Send a PATCH request and check the response.
    ///
    /// # Errors
    ///
    /// See [`TestClient::request`].
    pub async fn patch(&self, path: &str, opts: RequestOpts) -> HarnessResult<Value> {
        self.request(Method::PATCH, path, opts).await
    }

    /// Send a DELETE request and check the response.
    ///
    /// # Errors
    ///
    /// See [`TestClient::request`].
    pub async fn delete(&self, path: &str, opts: RequestOpts) -> HarnessResult<Value> {
        self.request(Method::DELETE, path, opts).await
    }

    /// Send one request and check the response against `opts.expectations`.
    ///
    /// Malformed expectations are rejected before any I/O. On success the
    /// parsed response body is returned: JSON where the body parses, `Null`
    /// for an empty body, and the raw text as a string otherwise.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`HarnessError`], or
    /// [`HarnessError::Transport`] when the request itself fails after the
    /// retry budget is spent.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        opts: RequestOpts,
    ) -> HarnessResult<Value> {
        validate_expectations(&opts.expectations)?;

        let url = self.build_url(path, &opts.query);
        let headers = self.resolve_headers(&opts.headers).await?;
        let response = self.send_with_retry(&method, &url, &headers, &opts).await?;
        self.check_response(&method, path, response, &opts.expectations)
            .await
    }

    fn build_url(&self, path: &str, query: &[(String, Option<String>)]) -> String {
        let mut url = format!("{}{}{path}", self.base_url, self.prefix);
        let query_string = build_query_string(query);
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }
        url
    }

    /// Auth headers first, then the stacktrace opt-in, then per-call
    /// overrides. Later entries replace earlier ones.
    async fn resolve_headers(&self, overrides: &[(String, String)]) -> HarnessResult<HeaderMap> {
        let mut pairs = self.auth.auth_headers().await?;
        pairs.push((HEADER_INCLUDE_STACKTRACE.to_string(), "true".to_string()));
        pairs.extend(overrides.iter().cloned());

        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| HarnessError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(&value).map_err(|e| HarnessError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }

    /// Multipart bodies are not replayable, so the request is rebuilt from
    /// `opts` on every attempt.
    async fn send_with_retry(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        opts: &RequestOpts,
    ) -> HarnessResult<Response> {
        let mut attempt: u32 = 1;
        loop {
            let request = self.build_request(method, url, headers, opts).await?;
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_ATTEMPTS && is_connection_reset(&e) => {
                    debug!(attempt, url, "connection reset, retrying");
                    attempt = attempt.saturating_add(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn build_request(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        opts: &RequestOpts,
    ) -> HarnessResult<reqwest::RequestBuilder> {
        let mut builder = self
            .client
            .request(method.clone(), url)
            .headers(headers.clone());
        if let Some(body) = &opts.body {
            builder = builder.json(body);
        } else if !opts.fields.is_empty() || !opts.files.is_empty() {
            builder = builder.multipart(build_form(opts).await?);
        }
        Ok(builder)
    }

    async fn check_response(
        &self,
        method: &Method,
        path: &str,
        response: Response,
        expectations: &Expectations,
    ) -> HarnessResult<Value> {
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        let expected = expectations.expected_status();
        if status.as_u16() != expected {
            return Err(HarnessError::StatusMismatch {
                expected,
                actual: status.as_u16(),
                detail: describe_body(&text),
            });
        }

        for name in &expectations.headers_not_present {
            if let Some(value) = headers.get(name) {
                return Err(HarnessError::UnexpectedHeader {
                    name: name.clone(),
                    value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                });
            }
        }

        for (name, expectation) in &expectations.headers {
            // None values were rejected before any I/O.
            let Some(expectation) = expectation else {
                continue;
            };
            match headers.get(name) {
                Some(value) => {
                    let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
                    if !expectation.matches(&value) {
                        return Err(HarnessError::HeaderMismatch {
                            name: name.clone(),
                            expected: expectation.describe(),
                            actual: format!("'{value}'"),
                        });
                    }
                }
                None => {
                    return Err(HarnessError::HeaderMismatch {
                        name: name.clone(),
                        expected: expectation.describe(),
                        actual: "<missing>".to_string(),
                    });
                }
            }
        }

        // Every response is JSON unless the caller expects 204 or declared
        // their own content-type expectation.
        if expected != 204 && !expectations.overrides_content_type() {
            let content_type = headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if !content_type.starts_with("application/json") {
                return Err(HarnessError::HeaderMismatch {
                    name: "content-type".to_string(),
                    expected: "'application/json'".to_string(),
                    actual: format!("'{content_type}'"),
                });
            }
        }

        let body = parse_body(&text);

        if let Some(subset) = &expectations.body
            && !json_contains(subset, &body)
        {
            return Err(HarnessError::BodyMismatch {
                expected: pretty(subset),
                actual: pretty(&body),
            });
        }

        if let Some(spec) = &self.openapi
            && status.is_success()
        {
            spec.validate_response(method.as_str(), path, status.as_u16(), &body)?;
        }

        Ok(body)
    }
}

/// Reject malformed expectations before touching the network.
fn validate_expectations(expectations: &Expectations) -> HarnessResult<()> {
    for (name, expectation) in &expectations.headers {
        if expectation.is_none() {
            return Err(HarnessError::UndefinedHeaderExpectation { name: name.clone() });
        }
    }
    Ok(())
}

/// Join query pairs, dropping entries with no value or an empty value.
fn build_query_string(query: &[(String, Option<String>)]) -> String {
    query
        .iter()
        .filter_map(|(key, value)| match value {
            Some(value) if !value.is_empty() => Some(format!("{key}={value}")),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("&")
}

async fn build_form(opts: &RequestOpts) -> HarnessResult<Form> {
    let mut form = Form::new();
    for (name, value) in &opts.fields {
        form = form.text(name.clone(), value.clone());
    }
    for (name, attachment) in &opts.files {
        let part = match attachment {
            Attachment::Bytes(content) => Part::bytes(content.clone()).file_name(name.clone()),
            Attachment::Named { filename, content } => {
                Part::bytes(content.clone()).file_name(filename.clone())
            }
            Attachment::File(path) => {
                let content =
                    tokio::fs::read(path)
                        .await
                        .map_err(|e| HarnessError::AttachmentError {
                            name: name.clone(),
                            message: format!("failed to read {}: {e}", path.display()),
                        })?;
                let filename = path
                    .file_name()
                    .and_then(|f| f.to_str())
                    .unwrap_or("attachment")
                    .to_string();
                Part::bytes(content).file_name(filename)
            }
        };
        form = form.part(name.clone(), part);
    }
    Ok(form)
}

/// Whether the error chain bottoms out in a connection reset. Nothing else
/// qualifies for a retry.
fn is_connection_reset(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
            )
        {
            return true;
        }
        source = cause.source();
    }
    false
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Pretty-print a body for a status-mismatch diagnostic. A `stack` field in
/// a JSON object body is pulled out and appended on its own so server stack
/// traces stay readable.
fn describe_body(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut map)) => {
            let stack = map
                .remove("stack")
                .and_then(|v| v.as_str().map(String::from));
            let body = pretty(&Value::Object(map));
            match stack {
                Some(stack) => format!("{body}\nstack:\n{stack}"),
                None => body,
            }
        }
        Ok(other) => pretty(&other),
        Err(_) => text.to_string(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Partial match: objects may carry extra keys, arrays must agree in length
/// and match element-wise, scalars must be equal.
fn json_contains(subset: &Value, actual: &Value) -> bool {
    match (subset, actual) {
        (Value::Object(sub), Value::Object(act)) => sub
            .iter()
            .all(|(key, value)| act.get(key).is_some_and(|a| json_contains(value, a))),
        (Value::Array(sub), Value::Array(act)) => {
            sub.len() == act.len()
                && sub
                    .iter()
                    .zip(act)
                    .all(|(s, a)| json_contains(s, a))
        }
        (s, a) => s == a,
    }
}
