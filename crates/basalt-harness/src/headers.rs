//! Platform header names and API prefixes.

/// API key header attached by the public API auth provider.
pub const HEADER_API_KEY: &str = "x-basalt-api-key";

/// Application id header.
pub const HEADER_APP_ID: &str = "x-basalt-app-id";

/// Asks the server to include stack traces in error responses. Attached to
/// every harness request.
pub const HEADER_INCLUDE_STACKTRACE: &str = "x-basalt-include-stacktrace";

/// Versioned prefix for the public API surface.
pub const PUBLIC_API_PREFIX: &str = "/api/public/v1";
