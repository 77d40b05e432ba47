//! Pluggable authentication header strategies.
//!
//! The harness never derives credentials itself; it asks an
//! [`AuthProvider`] for the headers to attach. Default-variant tests use
//! [`SessionAuth`] with session/tenant-derived headers the caller already
//! holds; public-API tests use [`PublicApiAuth`], which fetches a fresh API
//! key for every call.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HarnessResult;
use crate::headers::{HEADER_API_KEY, HEADER_APP_ID};

/// Supplies authentication headers for each call.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Headers to attach, applied before per-call overrides.
    async fn auth_headers(&self) -> HarnessResult<Vec<(String, String)>>;
}

/// Fixed session/tenant-derived headers (the default API variant).
#[derive(Debug, Clone, Default)]
pub struct SessionAuth {
    headers: Vec<(String, String)>,
}

impl SessionAuth {
    /// Wrap an already-derived header set.
    #[must_use]
    pub fn new(headers: Vec<(String, String)>) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl AuthProvider for SessionAuth {
    async fn auth_headers(&self) -> HarnessResult<Vec<(String, String)>> {
        Ok(self.headers.clone())
    }
}

/// Source of fresh API keys for the public API variant.
#[async_trait]
pub trait ApiKeySource: Send + Sync {
    /// Fetch a fresh API key.
    async fn fresh_api_key(&self) -> HarnessResult<String>;
}

/// Public-API auth: a fresh key per call plus tenant host and app id.
pub struct PublicApiAuth {
    key_source: Arc<dyn ApiKeySource>,
    tenant_host: String,
    app_id: String,
}

impl PublicApiAuth {
    /// Create a provider for the given tenant and app.
    #[must_use]
    pub fn new(
        key_source: Arc<dyn ApiKeySource>,
        tenant_host: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            key_source,
            tenant_host: tenant_host.into(),
            app_id: app_id.into(),
        }
    }
}

#[async_trait]
impl AuthProvider for PublicApiAuth {
    async fn auth_headers(&self) -> HarnessResult<Vec<(String, String)>> {
        let api_key = self.key_source.fresh_api_key().await?;
        Ok(vec![
            ("Host".to_string(), self.tenant_host.clone()),
            (HEADER_APP_ID.to_string(), self.app_id.clone()),
            (HEADER_API_KEY.to_string(), api_key),
        ])
    }
}
