//! Raw-content HTTPS backend
//!
//! Maps a logical path onto the provider's raw file URL:
//!
//! - `https://github.com/org/repo` → `https://raw.githubusercontent.com/org/repo/<branch>/<path>`
//! - GitLab hosts → `<base>/-/raw/<branch>/<path>`
//! - anything else → `<base>/<branch>/<path>`

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::auth::AuthContext;
use crate::backend::{RepoBackend, validate_logical_path};
use crate::credentials::SecureHttpClient;
use crate::error::{AssetError, Result};

/// HTTPS repository backend
pub struct HttpBackend {
    /// Base URL files are resolved against, without trailing slash
    raw_base: String,
    location: String,
    branch: String,
    provider: String,
    auth: Arc<dyn AuthContext>,
    client: SecureHttpClient,
}

impl HttpBackend {
    pub fn new(
        repository_url: &str,
        branch: &str,
        provider: &str,
        auth: Arc<dyn AuthContext>,
        timeout: Duration,
    ) -> Result<Self> {
        let location = repository_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&location).map_err(|e| AssetError::InvalidRepositoryUrl {
            url: location.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            raw_base: raw_base(&parsed, &location),
            location,
            branch: branch.trim().to_string(),
            provider: provider.to_string(),
            auth,
            client: SecureHttpClient::new(timeout)?,
        })
    }

    /// Full URL for a logical path
    pub fn file_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.raw_base,
            self.branch,
            path.trim().trim_start_matches("./")
        )
    }
}

fn raw_base(url: &Url, location: &str) -> String {
    let host = url.host_str().unwrap_or_default();

    if host == "github.com" || host == "www.github.com" {
        let repo_path = url.path().trim_matches('/').trim_end_matches(".git");
        return format!("https://raw.githubusercontent.com/{}", repo_path);
    }
    if host.contains("gitlab") {
        return format!("{}/-/raw", location.trim_end_matches(".git"));
    }
    location.to_string()
}

#[async_trait]
impl RepoBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    fn location(&self) -> &str {
        &self.location
    }

    async fn get_file(&self, path: &str) -> Result<Vec<u8>> {
        validate_logical_path(path)?;

        let credentials = if self.provider == "none" {
            None
        } else {
            match self.auth.get_credentials(&self.provider).await {
                Ok(creds) => Some(creds),
                Err(e) if e.is_no_token() => None,
                Err(e) => return Err(e),
            }
        };

        let url = self.file_url(path);
        tracing::debug!(url = %url, authenticated = credentials.is_some(), "fetching file");

        match self.client.get_bytes(&url, credentials.as_ref()).await {
            Err(AssetError::NotFound { .. }) => Err(AssetError::NotFound {
                path: path.to_string(),
            }),
            other => other,
        }
    }
}
