//! Credential values and a redirect-safe HTTP client
//!
//! Credentials are attached only while a request stays on the origin it was
//! issued for. Redirects are followed by hand so a cross-origin hop never
//! carries the `Authorization` header.

use std::time::Duration;
use url::Url;

use crate::error::{AssetError, Result};

/// Maximum redirects followed before giving up
pub const MAX_REDIRECTS: u32 = 10;

/// Retry hint used when a 429 response carries no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER: u64 = 60;

/// Resolved credentials ready for use
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Basic { username: String, password: String },
    Bearer { token: String },
}

impl ResolvedCredentials {
    pub fn bearer(token: impl Into<String>) -> Self {
        ResolvedCredentials::Bearer {
            token: token.into(),
        }
    }

    /// Authorization header value
    pub fn auth_header(&self) -> String {
        match self {
            ResolvedCredentials::Basic { username, password } => {
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{}:{}", username, password),
                );
                format!("Basic {}", encoded)
            }
            ResolvedCredentials::Bearer { token } => format!("Bearer {}", token),
        }
    }
}

// Never print secrets, even at debug level
impl std::fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedCredentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            ResolvedCredentials::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// Check if two URLs are same-origin (for redirect safety)
pub fn same_origin(url1: &str, url2: &str) -> bool {
    match (Url::parse(url1), Url::parse(url2)) {
        (Ok(u1), Ok(u2)) => {
            u1.scheme() == u2.scheme()
                && u1.host() == u2.host()
                && u1.port_or_known_default() == u2.port_or_known_default()
        }
        _ => false,
    }
}

/// HTTP client with manual redirect handling
#[derive(Debug, Clone)]
pub struct SecureHttpClient {
    client: reqwest::Client,
}

impl SecureHttpClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            // Redirects are handled in `get` so credentials can be dropped
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .user_agent(concat!("zen-assets/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AssetError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client })
    }

    /// Fetch a URL, sending `credentials` only to the original origin
    pub async fn get(
        &self,
        url: &str,
        credentials: Option<&ResolvedCredentials>,
    ) -> Result<reqwest::Response> {
        let original_url = url.to_string();
        let mut current_url = original_url.clone();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            if let Some(creds) = credentials {
                if same_origin(&original_url, &current_url) {
                    request = request.header(reqwest::header::AUTHORIZATION, creds.auth_header());
                } else {
                    tracing::warn!(
                        from = %original_url,
                        to = %current_url,
                        "cross-origin redirect, credentials not forwarded"
                    );
                }
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(AssetError::NetworkError {
                        message: format!("Too many redirects (max {})", MAX_REDIRECTS),
                    });
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| AssetError::NetworkError {
                        message: "Redirect without Location header".to_string(),
                    })?;

                let base = Url::parse(&current_url)?;
                current_url = base.join(location)?.to_string();
                continue;
            }

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                return Err(AssetError::RateLimited { retry_after });
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(AssetError::AuthRequired { url: current_url });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(AssetError::AuthFailed {
                    message: format!("Access denied to {}", current_url),
                });
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(AssetError::NotFound { path: current_url });
            }

            if !status.is_success() {
                return Err(AssetError::HttpError {
                    status: status.as_u16(),
                    message: format!("Request to {} failed", current_url),
                });
            }

            return Ok(response);
        }
    }

    /// Fetch bytes from URL
    pub async fn get_bytes(
        &self,
        url: &str,
        credentials: Option<&ResolvedCredentials>,
    ) -> Result<Vec<u8>> {
        let response = self.get(url, credentials).await?;
        let bytes = response.bytes().await.map_err(|e| AssetError::NetworkError {
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}
