//! Per-request options and expectations.
//!
//! A [`RequestOpts`] value configures exactly one call and is discarded
//! afterwards. Attachments are an explicit tagged enum, decided at the call
//! site — there is no runtime shape-sniffing of "is this a file".

use std::path::PathBuf;

/// A file attachment in a multipart request.
///
/// Bodies must be replayable because a request may be retried after a
/// connection reset, so streaming sources are passed as paths or buffered
/// bytes.
#[derive(Debug, Clone)]
pub enum Attachment {
    /// Raw bytes; the attachment filename comes from the part name.
    Bytes(Vec<u8>),
    /// A file on disk, read when the request is built; filename taken from
    /// the path.
    File(PathBuf),
    /// Explicit filename and content.
    Named {
        /// Filename sent in the multipart part.
        filename: String,
        /// File content.
        content: Vec<u8>,
    },
}

/// Expected value for a single response header.
#[derive(Debug, Clone)]
pub enum HeaderExpectation {
    /// Exact string equality.
    Exact(String),
    /// Regular-expression match.
    Pattern(regex::Regex),
}

impl HeaderExpectation {
    /// Whether `value` satisfies this expectation.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Pattern(pattern) => pattern.is_match(value),
        }
    }

    /// Human-readable description for mismatch diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Exact(expected) => format!("'{expected}'"),
            Self::Pattern(pattern) => format!("pattern /{pattern}/"),
        }
    }
}

impl From<&str> for HeaderExpectation {
    fn from(value: &str) -> Self {
        Self::Exact(value.to_string())
    }
}

impl From<String> for HeaderExpectation {
    fn from(value: String) -> Self {
        Self::Exact(value)
    }
}

/// Response expectations for a single call.
#[derive(Debug, Default)]
pub struct Expectations {
    /// Expected status; `None` means 200.
    pub status: Option<u16>,
    /// Headers that must be present and match. Declaring a `None` value is
    /// a caller error reported before any I/O.
    pub headers: Vec<(String, Option<HeaderExpectation>)>,
    /// Headers that must be absent from the response.
    pub headers_not_present: Vec<String>,
    /// Subset the response body must contain (partial match, not equality).
    pub body: Option<serde_json::Value>,
}

impl Expectations {
    /// The expected status, defaulting to 200.
    #[must_use]
    pub fn expected_status(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    /// Whether the caller declared an explicit `content-type` expectation,
    /// overriding the implicit JSON one.
    #[must_use]
    pub fn overrides_content_type(&self) -> bool {
        self.headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
    }
}

/// Options for one harness request.
#[derive(Debug, Default)]
pub struct RequestOpts {
    /// Extra request headers, applied after auth-derived headers.
    pub headers: Vec<(String, String)>,
    /// Query parameters; pairs with `None` or empty values are dropped.
    pub query: Vec<(String, Option<String>)>,
    /// JSON request body.
    pub body: Option<serde_json::Value>,
    /// Multipart text fields.
    pub fields: Vec<(String, String)>,
    /// Multipart file attachments keyed by part name.
    pub files: Vec<(String, Attachment)>,
    /// Response expectations.
    pub expectations: Expectations,
}

impl RequestOpts {
    /// Empty options: no body, default expectations (status 200, JSON).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the JSON request body.
    #[must_use]
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), Some(value.into())));
        self
    }

    /// Add a multipart text field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// Add a multipart file attachment under `name`.
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, attachment: Attachment) -> Self {
        self.files.push((name.into(), attachment));
        self
    }

    /// Expect a specific response status.
    #[must_use]
    pub fn expect_status(mut self, status: u16) -> Self {
        self.expectations.status = Some(status);
        self
    }

    /// Expect a response header to match.
    #[must_use]
    pub fn expect_header(
        mut self,
        name: impl Into<String>,
        expectation: impl Into<HeaderExpectation>,
    ) -> Self {
        self.expectations
            .headers
            .push((name.into(), Some(expectation.into())));
        self
    }

    /// Expect a response header to be absent.
    #[must_use]
    pub fn expect_header_absent(mut self, name: impl Into<String>) -> Self {
        self.expectations.headers_not_present.push(name.into());
        self
    }

    /// Expect the response body to contain `subset` (partial match).
    #[must_use]
    pub fn expect_body(mut self, subset: serde_json::Value) -> Self {
        self.expectations.body = Some(subset);
        self
    }
}
