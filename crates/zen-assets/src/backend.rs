//! Repository backend trait and local implementations
//!
//! A backend fetches one file from the remote catalog by logical path. The
//! HTTPS implementation lives in [`crate::http`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthContext;
use crate::config::AssetConfig;
use crate::error::{AssetError, Result};
use crate::http::HttpBackend;

/// Logical path of the catalog manifest inside a repository
pub const MANIFEST_FILE: &str = "manifest.yaml";

/// Fetches files from a remote asset repository
#[async_trait]
pub trait RepoBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Where this backend reads from
    fn location(&self) -> &str;

    /// Fetch one file by logical path
    async fn get_file(&self, path: &str) -> Result<Vec<u8>>;

    /// List logical paths, where the backend supports it
    async fn list_files(&self) -> Result<Vec<String>> {
        Err(AssetError::RepositoryError {
            message: format!("{} backend cannot list files", self.name()),
        })
    }
}

/// Create a backend from configuration
///
/// `http(s)://` selects the HTTPS backend; `file://` or an absolute path
/// selects a cloned working tree.
pub fn create_backend(
    config: &AssetConfig,
    auth: Arc<dyn AuthContext>,
) -> Result<Arc<dyn RepoBackend>> {
    let url = config.repository_url.trim();

    if url.starts_with("http://") || url.starts_with("https://") {
        let backend = HttpBackend::new(
            url,
            &config.branch,
            &config.provider(),
            auth,
            config.sync_timeout(),
        )?;
        return Ok(Arc::new(backend));
    }

    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Arc::new(WorkingTreeBackend::new(path)));
    }

    if Path::new(url).is_absolute() {
        return Ok(Arc::new(WorkingTreeBackend::new(url)));
    }

    Err(AssetError::InvalidRepositoryUrl {
        url: url.to_string(),
        reason: "expected http(s)://, file:// or an absolute path".to_string(),
    })
}

/// Race `fut` against the caller's cancellation scope
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(AssetError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(AssetError::Cancelled),
        result = fut => result,
    }
}

/// Reject logical paths that could escape the repository root
pub fn validate_logical_path(path: &str) -> Result<&Path> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(AssetError::RepositoryError {
            message: "empty repository path".to_string(),
        });
    }

    let logical = Path::new(trimmed);
    let escapes = logical
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(AssetError::RepositoryError {
            message: format!("path escapes repository root: {}", trimmed),
        });
    }
    Ok(logical)
}

// ============ Working Tree Backend ============

/// Reads files from a cloned working tree on disk
#[derive(Debug, Clone)]
pub struct WorkingTreeBackend {
    root: PathBuf,
    location: String,
}

impl WorkingTreeBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let location = root.display().to_string();
        Self { root, location }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl RepoBackend for WorkingTreeBackend {
    fn name(&self) -> &str {
        "working-tree"
    }

    fn location(&self) -> &str {
        &self.location
    }

    async fn get_file(&self, path: &str) -> Result<Vec<u8>> {
        let logical = validate_logical_path(path)?;
        let full = self.root.join(logical);

        match tokio::fs::read(&full).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AssetError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(AssetError::RepositoryError {
                message: format!("failed to read {}: {}", full.display(), e),
            }),
        }
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let mut files: Vec<String> = walkdir::WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| e.file_name() != ".git")
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter_map(|e| {
                    e.path().strip_prefix(&root).ok().map(|rel| {
                        rel.components()
                            .map(|c| c.as_os_str().to_string_lossy())
                            .collect::<Vec<_>>()
                            .join("/")
                    })
                })
                .collect();
            files.sort();
            files
        })
        .await
        .map_err(|e| AssetError::RepositoryError {
            message: format!("listing task failed: {}", e),
        })
    }
}

// ============ In-Memory Backend ============

/// Failure injected into a [`MemoryBackend`] path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedFailure {
    Network(String),
    RateLimited(u64),
    Auth(String),
}

impl InjectedFailure {
    fn to_error(&self) -> AssetError {
        match self {
            InjectedFailure::Network(message) => AssetError::NetworkError {
                message: message.clone(),
            },
            InjectedFailure::RateLimited(retry_after) => AssetError::RateLimited {
                retry_after: *retry_after,
            },
            InjectedFailure::Auth(message) => AssetError::AuthFailed {
                message: message.clone(),
            },
        }
    }
}

/// In-memory backend for tests and embedding
///
/// Clones share the same store, so a test can keep a handle and change the
/// "remote" while a client holds another.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failures: Arc<RwLock<HashMap<String, InjectedFailure>>>,
    delay: Arc<RwLock<Option<Duration>>>,
    requests: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file
    pub fn insert(&self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), data.into());
    }

    pub fn remove(&self, path: &str) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path);
    }

    /// Make every fetch of `path` fail
    pub fn fail(&self, path: impl Into<String>, failure: InjectedFailure) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), failure);
    }

    pub fn clear_failures(&self) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Sleep before answering each request
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Number of `get_file` calls served so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepoBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn location(&self) -> &str {
        "memory://"
    }

    async fn get_file(&self, path: &str) -> Result<Vec<u8>> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = self
            .failures
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
        {
            return Err(failure.to_error());
        }

        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound {
                path: path.to_string(),
            })
    }

    async fn list_files(&self) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticAuth;

    #[test]
    fn test_validate_logical_path() {
        assert!(validate_logical_path("templates/x.md").is_ok());
        assert!(validate_logical_path("./templates/x.md").is_ok());
        assert!(validate_logical_path("../secret").is_err());
        assert!(validate_logical_path("templates/../../secret").is_err());
        assert!(validate_logical_path("/etc/passwd").is_err());
        assert!(validate_logical_path("  ").is_err());
    }

    #[tokio::test]
    async fn test_working_tree_backend() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::create_dir_all(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join("manifest.yaml"), "schema_version: '1'").unwrap();
        std::fs::write(dir.path().join("templates/x.md"), "hello").unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "ref").unwrap();

        let backend = WorkingTreeBackend::new(dir.path());
        assert_eq!(backend.get_file("templates/x.md").await.unwrap(), b"hello");

        let err = backend.get_file("templates/missing.md").await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound { .. }));

        let err = backend.get_file("../outside").await.unwrap_err();
        assert_eq!(err.code(), "repository_error");

        assert_eq!(
            backend.list_files().await.unwrap(),
            vec!["manifest.yaml".to_string(), "templates/x.md".to_string()]
        );
    }

    #[tokio::test]
    async fn test_memory_backend_failures() {
        let backend = MemoryBackend::new();
        backend.insert("a.md", "A");
        backend.fail("b.md", InjectedFailure::RateLimited(9));

        assert_eq!(backend.get_file("a.md").await.unwrap(), b"A");
        let err = backend.get_file("b.md").await.unwrap_err();
        assert_eq!(err.retry_after_seconds(), Some(9));
        assert!(matches!(
            backend.get_file("c.md").await.unwrap_err(),
            AssetError::NotFound { .. }
        ));
        assert_eq!(backend.requests(), 3);
    }

    #[tokio::test]
    async fn test_cancellable() {
        let token = CancellationToken::new();
        let value = cancellable(&token, async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);

        token.cancel();
        let err = cancellable(&token, async { Ok(2) }).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_slow_fetch() {
        let backend = MemoryBackend::new();
        backend.insert("slow.md", "x");
        backend.set_delay(Some(Duration::from_secs(60)));

        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            child.cancel();
        });

        let err = cancellable(&token, backend.get_file("slow.md"))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_create_backend_by_scheme() {
        let auth: Arc<dyn AuthContext> = Arc::new(StaticAuth::anonymous());

        let config = AssetConfig::default();
        assert_eq!(create_backend(&config, auth.clone()).unwrap().name(), "http");

        let config = AssetConfig {
            repository_url: "file:///srv/assets".to_string(),
            ..Default::default()
        };
        let backend = create_backend(&config, auth.clone()).unwrap();
        assert_eq!(backend.name(), "working-tree");
        assert_eq!(backend.location(), "/srv/assets");

        let config = AssetConfig {
            repository_url: "relative/dir".to_string(),
            ..Default::default()
        };
        assert!(create_backend(&config, auth).is_err());
    }
}
