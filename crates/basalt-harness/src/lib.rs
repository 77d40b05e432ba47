//! HTTP assertion harness for Basalt application servers.
//!
//! Drives requests against a running application server and checks the
//! response against declared expectations: status, headers (present, absent,
//! or pattern-matched), and a partial-match body. The public API variant
//! additionally validates every 2xx response against a pre-loaded OpenAPI
//! document.
//!
//! The server handle is explicit — a base URL passed to
//! [`TestClient::new`] — so tests carry no hidden global state. A call
//! either returns the validated response body or fails with a diagnostic
//! error; there is no partial success.
//!
//! Transient connection resets are retried up to two extra times before the
//! transport error propagates. No other failure is ever retried.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod auth;
pub mod client;
pub mod error;
pub mod headers;
pub mod openapi;
pub mod opts;

pub use auth::{ApiKeySource, AuthProvider, PublicApiAuth, SessionAuth};
pub use client::TestClient;
pub use error::{HarnessError, HarnessResult};
pub use openapi::OpenApiSpec;
pub use opts::{Attachment, Expectations, HeaderExpectation, RequestOpts};
