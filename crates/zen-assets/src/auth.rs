//! Credential providers for repository backends
//!
//! An [`AuthContext`] hands out opaque credentials per provider. Absence of a
//! token is reported as [`AssetError::NoToken`], which backends treat as a
//! signal to try anonymous access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::credentials::ResolvedCredentials;
use crate::error::{AssetError, Result};

/// Supplies and validates credentials for a provider (`github`, `gitlab`, ...)
#[async_trait]
pub trait AuthContext: Send + Sync {
    /// Make sure usable credentials exist for `provider`
    async fn authenticate(&self, provider: &str) -> Result<()> {
        self.validate_credentials(provider).await
    }

    /// Credentials for `provider`, or [`AssetError::NoToken`]
    async fn get_credentials(&self, provider: &str) -> Result<ResolvedCredentials>;

    /// Check the stored credentials without contacting the remote
    async fn validate_credentials(&self, provider: &str) -> Result<()> {
        let creds = self.get_credentials(provider).await?;
        validate_shape(provider, &creds)
    }

    /// Drop any memoized credentials and resolve them again
    async fn refresh_credentials(&self, provider: &str) -> Result<()>;
}

fn validate_shape(provider: &str, creds: &ResolvedCredentials) -> Result<()> {
    let secret = match creds {
        ResolvedCredentials::Bearer { token } => token,
        ResolvedCredentials::Basic { password, .. } => password,
    };
    if secret.is_empty() || secret.chars().any(char::is_whitespace) {
        return Err(AssetError::AuthFailed {
            message: format!("malformed token for provider {}", provider),
        });
    }
    Ok(())
}

/// Environment variables consulted for a provider, most specific first
pub fn token_env_vars(provider: &str) -> Vec<String> {
    let upper = provider.trim().to_ascii_uppercase();
    let mut vars = vec![format!("ZEN_{}_TOKEN", upper)];
    match upper.as_str() {
        "GITHUB" => vars.push("GITHUB_TOKEN".to_string()),
        "GITLAB" => vars.push("GITLAB_TOKEN".to_string()),
        _ => {}
    }
    vars
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Tokens from the environment, then from an explicit per-provider map
pub struct EnvAuth {
    lookup: EnvLookup,
    explicit: HashMap<String, String>,
    resolved: RwLock<HashMap<String, Option<String>>>,
}

impl EnvAuth {
    /// Read tokens from the process environment
    pub fn new() -> Self {
        Self::with_lookup(|key| std::env::var(key).ok())
    }

    /// Read tokens through a custom lookup instead of the environment
    pub fn with_lookup(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            lookup: Arc::new(lookup),
            explicit: HashMap::new(),
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Fallback token used when the environment has none
    pub fn with_token(mut self, provider: &str, token: impl Into<String>) -> Self {
        self.explicit
            .insert(provider.trim().to_ascii_lowercase(), token.into());
        self
    }

    fn resolve(&self, provider: &str) -> Option<String> {
        token_env_vars(provider)
            .iter()
            .filter_map(|var| (self.lookup)(var))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
            .or_else(|| self.explicit.get(provider).cloned())
    }

    fn cached(&self, provider: &str) -> Option<String> {
        if let Some(hit) = self
            .resolved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
        {
            return hit.clone();
        }

        let token = self.resolve(provider);
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), token.clone());
        token
    }
}

impl Default for EnvAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthContext for EnvAuth {
    async fn get_credentials(&self, provider: &str) -> Result<ResolvedCredentials> {
        let provider = provider.trim().to_ascii_lowercase();
        if provider == "none" {
            return Err(AssetError::NoToken { provider });
        }
        match self.cached(&provider) {
            Some(token) => Ok(ResolvedCredentials::Bearer { token }),
            None => Err(AssetError::NoToken { provider }),
        }
    }

    async fn refresh_credentials(&self, provider: &str) -> Result<()> {
        let provider = provider.trim().to_ascii_lowercase();
        self.resolved
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&provider);
        tracing::debug!(provider = %provider, "refreshing credentials");
        self.validate_credentials(&provider).await
    }
}

/// Fixed credentials, or none at all
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    credentials: Option<ResolvedCredentials>,
}

impl StaticAuth {
    /// Always anonymous
    pub fn anonymous() -> Self {
        Self { credentials: None }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            credentials: Some(ResolvedCredentials::bearer(token)),
        }
    }
}

#[async_trait]
impl AuthContext for StaticAuth {
    async fn get_credentials(&self, provider: &str) -> Result<ResolvedCredentials> {
        self.credentials.clone().ok_or_else(|| AssetError::NoToken {
            provider: provider.to_string(),
        })
    }

    async fn refresh_credentials(&self, provider: &str) -> Result<()> {
        self.validate_credentials(provider).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_token_env_vars() {
        assert_eq!(token_env_vars("github"), vec!["ZEN_GITHUB_TOKEN", "GITHUB_TOKEN"]);
        assert_eq!(token_env_vars("gitlab"), vec!["ZEN_GITLAB_TOKEN", "GITLAB_TOKEN"]);
        assert_eq!(token_env_vars("gitea"), vec!["ZEN_GITEA_TOKEN"]);
    }

    #[tokio::test]
    async fn test_env_precedence() {
        let auth = EnvAuth::with_lookup(lookup_from(&[
            ("ZEN_GITHUB_TOKEN", "zen-token"),
            ("GITHUB_TOKEN", "gh-token"),
        ]))
        .with_token("github", "explicit");

        assert_eq!(
            auth.get_credentials("GitHub").await.unwrap(),
            ResolvedCredentials::bearer("zen-token")
        );
    }

    #[tokio::test]
    async fn test_explicit_fallback() {
        let auth = EnvAuth::with_lookup(lookup_from(&[])).with_token("gitlab", "explicit");
        assert_eq!(
            auth.get_credentials("gitlab").await.unwrap(),
            ResolvedCredentials::bearer("explicit")
        );
    }

    #[tokio::test]
    async fn test_no_token_is_signalled() {
        let auth = EnvAuth::with_lookup(lookup_from(&[("GITHUB_TOKEN", "  ")]));
        let err = auth.authenticate("github").await.unwrap_err();
        assert!(err.is_no_token());

        let err = auth.authenticate("none").await.unwrap_err();
        assert!(err.is_no_token());
    }

    #[tokio::test]
    async fn test_malformed_token_rejected() {
        let auth = EnvAuth::with_lookup(lookup_from(&[("GITHUB_TOKEN", "two words")]));
        let err = auth.validate_credentials("github").await.unwrap_err();
        assert!(matches!(err, AssetError::AuthFailed { .. }));
    }

    #[tokio::test]
    async fn test_refresh_rereads_lookup() {
        let value = Arc::new(Mutex::new(None::<String>));
        let source = value.clone();
        let auth = EnvAuth::with_lookup(move |key| {
            if key == "GITHUB_TOKEN" {
                source.lock().unwrap().clone()
            } else {
                None
            }
        });

        assert!(auth.get_credentials("github").await.unwrap_err().is_no_token());

        *value.lock().unwrap() = Some("fresh".to_string());
        // Memoized until refreshed
        assert!(auth.get_credentials("github").await.is_err());

        auth.refresh_credentials("github").await.unwrap();
        assert_eq!(
            auth.get_credentials("github").await.unwrap(),
            ResolvedCredentials::bearer("fresh")
        );
    }

    #[tokio::test]
    async fn test_static_auth() {
        assert!(StaticAuth::anonymous()
            .authenticate("github")
            .await
            .unwrap_err()
            .is_no_token());
        assert!(StaticAuth::bearer("abc").authenticate("github").await.is_ok());
    }
}
