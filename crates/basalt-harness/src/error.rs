//! Harness error types.

/// Errors from harness requests and assertions.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// An expected header was declared without a value.
    #[error(
        "expected value for header '{name}' is undefined — use headers_not_present to assert absence"
    )]
    UndefinedHeaderExpectation {
        /// The header name.
        name: String,
    },

    /// The response status did not match the expectation.
    #[error("expected status {expected}, got {actual}: {detail}")]
    StatusMismatch {
        /// Expected status code.
        expected: u16,
        /// Actual status code.
        actual: u16,
        /// Pretty-printed response body, with any `stack` field extracted
        /// and appended separately.
        detail: String,
    },

    /// A response header did not match its expectation.
    #[error("header '{name}' mismatch: expected {expected}, got {actual}")]
    HeaderMismatch {
        /// The header name.
        name: String,
        /// Description of the expected value or pattern.
        expected: String,
        /// The actual value, or `<missing>`.
        actual: String,
    },

    /// A header declared absent was present in the response.
    #[error("header '{name}' expected to be absent, got '{value}'")]
    UnexpectedHeader {
        /// The header name.
        name: String,
        /// The value that was present.
        value: String,
    },

    /// The response body did not contain the expected subset.
    #[error("body mismatch:\nexpected subset:\n{expected}\nactual:\n{actual}")]
    BodyMismatch {
        /// Pretty-printed expected subset.
        expected: String,
        /// Pretty-printed actual body.
        actual: String,
    },

    /// The route or response status is not documented in the OpenAPI
    /// document.
    #[error("no documented {missing} for {method} {path} ({status})")]
    Undocumented {
        /// What is missing from the document (`path`, `operation`,
        /// `response`).
        missing: String,
        /// Request method.
        method: String,
        /// Request path (relative to the public prefix).
        path: String,
        /// Response status.
        status: u16,
    },

    /// The response did not conform to the documented schema.
    #[error("schema violation for {method} {path} ({status}): {violations}")]
    SchemaViolation {
        /// Request method.
        method: String,
        /// Request path (relative to the public prefix).
        path: String,
        /// Response status.
        status: u16,
        /// Joined validation error messages.
        violations: String,
    },

    /// The OpenAPI document could not be loaded or is malformed.
    #[error("OpenAPI document error: {message}")]
    SpecError {
        /// What went wrong.
        message: String,
    },

    /// A file attachment could not be read.
    #[error("attachment error for '{name}': {message}")]
    AttachmentError {
        /// The attachment's part name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// The authentication provider failed.
    #[error("auth error: {message}")]
    AuthError {
        /// What went wrong.
        message: String,
    },

    /// A header name or value could not be encoded.
    #[error("invalid header '{name}': {message}")]
    InvalidHeader {
        /// The header name.
        name: String,
        /// What went wrong.
        message: String,
    },

    /// Underlying transport failure, surfaced after the bounded
    /// retry-on-reset policy is exhausted.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;
