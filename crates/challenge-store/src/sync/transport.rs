// Authenticated JSON transport for the sync adapter.
//
// `HttpTransport` talks to the server with reqwest; tests substitute their
// own `SyncTransport` implementation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use serde_json::Value;
use tracing::{debug, warn};

use super::SyncError;
use crate::config::{Config, CredentialsConfig};

/// Sent as `X-CSRFToken`; header names are case-insensitive.
const CSRF_HEADER: HeaderName = HeaderName::from_static("x-csrftoken");

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One JSON round trip per call. Paths are absolute server paths
/// (`/save_tab/`).
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<Value, SyncError>;

    /// Mutating call; carries the CSRF token.
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SyncError>;
}

#[async_trait]
impl<T: SyncTransport + ?Sized> SyncTransport for Arc<T> {
    async fn get_json(&self, path: &str) -> Result<Value, SyncError> {
        (**self).get_json(path).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SyncError> {
        (**self).post_json(path, body).await
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    csrf_token: Option<String>,
    session_cookie: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, credentials: &CredentialsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            csrf_token: non_empty(credentials.csrf_token.as_deref()),
            session_cookie: non_empty(credentials.session_cookie.as_deref()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.server.base_url, &config.credentials)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn base_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &self.session_cookie {
            match HeaderValue::from_str(cookie) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(_) => warn!("session cookie contains invalid header characters; not sent"),
            }
        }
        headers
    }

    async fn read_response(response: reqwest::Response) -> Result<Value, SyncError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        serde_json::from_str(&body).map_err(|e| SyncError::Malformed(format!("invalid JSON: {e}")))
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn get_json(&self, path: &str) -> Result<Value, SyncError> {
        debug!(path, "GET");
        let response = self
            .http
            .get(self.url(path))
            .headers(self.base_headers())
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SyncError> {
        let token = self.csrf_token.as_deref().ok_or(SyncError::MissingCsrfToken)?;
        let token = HeaderValue::from_str(token).map_err(|_| SyncError::MissingCsrfToken)?;

        let mut headers = self.base_headers();
        headers.insert(CSRF_HEADER, token);

        debug!(path, "POST");
        let response = self
            .http
            .post(self.url(path))
            .headers(headers)
            .json(body)
            .send()
            .await?;
        Self::read_response(response).await
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
