//! Asset client facade
//!
//! Combines the catalog, the on-disk cache and a repository backend behind
//! get, list, sync and cache-maintenance operations. Every async operation
//! takes the caller's [`CancellationToken`].

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;
use zen_core::{
    AssetContent, SharedClock, SystemClock, checksum_matches, compute_checksum,
    normalize_checksum, write_atomic,
};

use crate::auth::{AuthContext, EnvAuth};
use crate::backend::{MANIFEST_FILE, RepoBackend, cancellable, create_backend};
use crate::cache::{CacheConfig, CacheInfo, CacheStore, CleanupReport};
use crate::catalog::{AssetList, Catalog, CatalogEngine, Filter};
use crate::config::AssetConfig;
use crate::error::{AssetError, Result};
use crate::manifest::{Manifest, ManifestParser};

/// Workspace-relative location of the last accepted manifest
pub const LOCAL_MANIFEST_PATH: &str = ".zen/assets/manifest.yaml";

/// Options for [`AssetClient::get_asset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetOptions {
    pub use_cache: bool,
    pub verify_integrity: bool,
    pub include_metadata: bool,
}

impl Default for GetOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            verify_integrity: true,
            include_metadata: true,
        }
    }
}

/// Input to [`AssetClient::sync_repository`]
#[derive(Debug, Clone, Default)]
pub struct SyncRequest {
    /// Rebuild the catalog even when the manifest bytes are unchanged
    pub force: bool,
    /// Auth provider override; defaults to the configured one
    pub provider: Option<String>,
}

/// Outcome of a sync that did not fail outright
///
/// A parse failure is the third outcome and is returned as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Partial,
}

/// Result of [`AssetClient::sync_repository`]
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
    pub total_assets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cache: CacheInfo,
    pub synced_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_version: Option<String>,
    pub authenticated: bool,
}

/// Request counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClientMetrics {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fetches: u64,
    pub errors: u64,
    pub syncs: u64,
    pub last_sync_duration_ms: Option<u64>,
}

/// Snapshot for `status` style output
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatus {
    pub repository_url: String,
    pub branch: String,
    pub backend: String,
    pub catalog_size: usize,
    pub catalog_version: String,
    pub last_sync: Option<DateTime<Utc>>,
    pub manifest_path: PathBuf,
    pub cache: CacheInfo,
}

/// Builder for [`AssetClient`]
pub struct AssetClientBuilder {
    config: AssetConfig,
    workspace: PathBuf,
    backend: Option<Arc<dyn RepoBackend>>,
    auth: Option<Arc<dyn AuthContext>>,
    clock: Option<SharedClock>,
    cache_config: Option<CacheConfig>,
}

impl AssetClientBuilder {
    /// Directory holding `.zen/assets/manifest.yaml`
    pub fn workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Use a specific backend instead of one derived from `repository_url`
    pub fn backend(mut self, backend: Arc<dyn RepoBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn auth(mut self, auth: Arc<dyn AuthContext>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the cache location and limits derived from the config
    pub fn cache_config(mut self, cache_config: CacheConfig) -> Self {
        self.cache_config = Some(cache_config);
        self
    }

    pub fn build(self) -> Result<AssetClient> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(EnvAuth::new()) as Arc<dyn AuthContext>);
        let backend = match self.backend {
            Some(backend) => backend,
            None => create_backend(&self.config, auth.clone())?,
        };
        let cache_config = self
            .cache_config
            .unwrap_or_else(|| CacheConfig::from(&self.config));
        let cache = CacheStore::open(cache_config, clock.clone())?;

        tracing::debug!(
            backend = backend.name(),
            location = backend.location(),
            workspace = %self.workspace.display(),
            "asset client ready"
        );

        Ok(AssetClient {
            config: self.config,
            workspace: self.workspace,
            backend,
            auth,
            cache,
            catalog: CatalogEngine::new(),
            metrics: RwLock::new(ClientMetrics::default()),
            clock,
        })
    }
}

/// Facade over catalog, cache and backend
pub struct AssetClient {
    config: AssetConfig,
    workspace: PathBuf,
    backend: Arc<dyn RepoBackend>,
    auth: Arc<dyn AuthContext>,
    cache: CacheStore,
    catalog: CatalogEngine,
    metrics: RwLock<ClientMetrics>,
    clock: SharedClock,
}

impl AssetClient {
    pub fn builder(config: AssetConfig) -> AssetClientBuilder {
        AssetClientBuilder {
            config,
            workspace: PathBuf::from("."),
            backend: None,
            auth: None,
            clock: None,
            cache_config: None,
        }
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn catalog(&self) -> &CatalogEngine {
        &self.catalog
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Path of the persisted manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.workspace.join(LOCAL_MANIFEST_PATH)
    }

    fn record(&self, update: impl FnOnce(&mut ClientMetrics)) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut *metrics);
    }

    /// Counters accumulated since construction
    pub fn metrics(&self) -> ClientMetrics {
        self.metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ============ Get ============

    /// Fetch an asset by name, through the cache when allowed
    pub async fn get_asset(
        &self,
        name: &str,
        options: GetOptions,
        token: &CancellationToken,
    ) -> Result<AssetContent> {
        self.record(|m| m.requests += 1);
        let result = self.get_asset_inner(name, options, token).await;
        if result.is_err() {
            self.record(|m| m.errors += 1);
        }
        result
    }

    async fn get_asset_inner(
        &self,
        name: &str,
        options: GetOptions,
        token: &CancellationToken,
    ) -> Result<AssetContent> {
        if name.trim().is_empty() {
            return Err(AssetError::empty_name());
        }

        self.ensure_loaded(token).await?;
        let catalog = self.catalog.snapshot();
        let verify = options.verify_integrity && self.config.integrity_checks_enabled;

        if options.use_cache
            && let Some(hit) = self.cached(name, verify, &catalog)
        {
            self.record(|m| m.cache_hits += 1);
            return Ok(finish(hit, &catalog, name, options.include_metadata));
        }
        if options.use_cache {
            self.record(|m| m.cache_misses += 1);
        }

        let record = catalog.get(name).cloned().ok_or_else(|| {
            AssetError::asset_not_found(name, catalog.suggest(name))
        })?;

        self.record(|m| m.fetches += 1);
        let bytes = cancellable(token, self.backend.get_file(&record.path)).await?;
        if token.is_cancelled() {
            return Err(AssetError::Cancelled);
        }

        let checksum = compute_checksum(&bytes);
        if verify
            && let Some(expected) = record.expected_checksum()
            && !checksum_matches(expected, &checksum)
        {
            tracing::warn!(name, "fetched asset failed integrity check");
            return Err(AssetError::IntegrityCheckFailed {
                name: name.to_string(),
                expected: normalize_checksum(expected),
                actual: normalize_checksum(&checksum),
            });
        }

        let content = AssetContent::new(bytes, Some(record));
        if options.use_cache
            && let Err(e) = self.cache.put(name, &content)
        {
            tracing::warn!(name, error = %e, "failed to cache asset");
        }

        tracing::debug!(name, size = content.len(), "fetched asset");
        Ok(finish(content, &catalog, name, options.include_metadata))
    }

    /// Cache lookup that treats damaged or stale entries as misses
    fn cached(&self, name: &str, verify: bool, catalog: &Catalog) -> Option<AssetContent> {
        let hit = match self.cache.get(name, verify) {
            Ok(hit) => hit?,
            Err(e) => {
                tracing::warn!(name, error = %e, "discarding unusable cache entry");
                return None;
            }
        };

        // A catalog update may have moved the published checksum on
        if verify
            && let Some(expected) = catalog.get(name).and_then(|r| r.expected_checksum())
            && !checksum_matches(expected, &hit.checksum)
        {
            tracing::debug!(name, "cached asset is stale, refetching");
            self.cache.delete(name);
            return None;
        }
        Some(hit)
    }

    // ============ List ============

    /// Query the catalog
    pub async fn list_assets(&self, filter: &Filter, token: &CancellationToken) -> Result<AssetList> {
        self.record(|m| m.requests += 1);
        self.ensure_loaded(token).await?;
        Ok(self.catalog.list(filter))
    }

    /// Load the catalog on first use: local manifest first, then the backend
    pub async fn ensure_loaded(&self, token: &CancellationToken) -> Result<()> {
        if self.catalog.is_loaded() || self.load_local(token).await? {
            return Ok(());
        }

        let bytes = self.fetch_manifest(token).await?;
        let manifest = ManifestParser::parse(&bytes)?;
        if let Err(e) = self.persist_manifest(&bytes) {
            tracing::warn!(error = %e, "failed to persist manifest");
        }
        self.install(manifest, bytes, Some(self.clock.now()));
        tracing::debug!(backend = self.backend.name(), "catalog loaded from repository");
        Ok(())
    }

    /// Install the persisted workspace manifest, if there is a usable one
    async fn load_local(&self, token: &CancellationToken) -> Result<bool> {
        let local = self.manifest_path();
        match cancellable(token, async { Ok(tokio::fs::read(&local).await) }).await? {
            Ok(bytes) => match ManifestParser::parse(&bytes) {
                Ok(manifest) => {
                    let loaded_at = file_modified(&local).await;
                    self.install(manifest, bytes, loaded_at);
                    tracing::debug!(path = %local.display(), "catalog loaded from workspace");
                    Ok(true)
                }
                Err(e) => {
                    tracing::warn!(path = %local.display(), error = %e, "local manifest unusable");
                    Ok(false)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                tracing::warn!(path = %local.display(), error = %e, "cannot read local manifest");
                Ok(false)
            }
        }
    }

    fn install(&self, manifest: Manifest, bytes: Vec<u8>, at: Option<DateTime<Utc>>) {
        self.catalog.replace(Catalog::new(
            manifest.records,
            bytes,
            manifest.version,
            at,
        ));
    }

    async fn fetch_manifest(&self, token: &CancellationToken) -> Result<Vec<u8>> {
        let timeout = self.config.sync_timeout();
        cancellable(token, async {
            tokio::time::timeout(timeout, self.backend.get_file(MANIFEST_FILE))
                .await
                .map_err(|_| AssetError::Timeout {
                    seconds: timeout.as_secs(),
                })?
        })
        .await
    }

    fn persist_manifest(&self, bytes: &[u8]) -> Result<()> {
        write_atomic(&self.manifest_path(), bytes)?;
        Ok(())
    }

    // ============ Sync ============

    /// Pull the manifest and replace the catalog
    ///
    /// Fetch and persistence failures give a `partial` result and keep the
    /// previous catalog. A manifest that fails to parse is an error.
    pub async fn sync_repository(
        &self,
        request: SyncRequest,
        token: &CancellationToken,
    ) -> Result<SyncResult> {
        let started = self.clock.instant();
        self.record(|m| m.syncs += 1);

        let result = self.sync_inner(request, token, started).await;
        match &result {
            Ok(r) => {
                let elapsed = r.duration_ms;
                self.record(|m| m.last_sync_duration_ms = Some(elapsed));
            }
            Err(_) => self.record(|m| m.errors += 1),
        }
        result
    }

    async fn sync_inner(
        &self,
        request: SyncRequest,
        token: &CancellationToken,
        started: std::time::Instant,
    ) -> Result<SyncResult> {
        let provider = request
            .provider
            .map(|p| p.trim().to_ascii_lowercase())
            .unwrap_or_else(|| self.config.provider());

        let authenticated = if provider == "none" {
            false
        } else {
            match cancellable(token, self.auth.authenticate(&provider)).await {
                Ok(()) => true,
                Err(e) if e.is_no_token() => {
                    tracing::debug!(provider = %provider, "no credentials, syncing anonymously");
                    false
                }
                Err(e) => return Err(e),
            }
        };

        let elapsed_ms = |clock: &SharedClock| {
            u64::try_from(clock.instant().saturating_duration_since(started).as_millis())
                .unwrap_or(u64::MAX)
        };

        // Diff against the persisted catalog when this process has none yet
        if !self.catalog.is_loaded() {
            self.load_local(token).await?;
        }
        let previous = self.catalog.snapshot();
        let partial = |error: String| SyncResult {
            status: SyncStatus::Partial,
            added: 0,
            removed: 0,
            updated: 0,
            total_assets: previous.len(),
            error: Some(error),
            cache: self.cache.info(),
            synced_at: self.clock.now(),
            duration_ms: elapsed_ms(&self.clock),
            manifest_version: None,
            authenticated,
        };

        let bytes = match self.fetch_manifest(token).await {
            Ok(bytes) => bytes,
            Err(AssetError::Cancelled) => return Err(AssetError::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, "manifest fetch failed, keeping current catalog");
                return Ok(partial(format!("failed to load manifest: {}", e)));
            }
        };

        let now = self.clock.now();

        if !request.force && previous.is_loaded() && previous.source_bytes() == bytes.as_slice() {
            self.catalog.replace(previous.with_last_sync(now));
            tracing::info!(assets = previous.len(), "manifest unchanged");
            return Ok(SyncResult {
                status: SyncStatus::Success,
                added: 0,
                removed: 0,
                updated: 0,
                total_assets: previous.len(),
                error: None,
                cache: self.cache.info(),
                synced_at: now,
                duration_ms: elapsed_ms(&self.clock),
                manifest_version: Some(previous.version().to_string()),
                authenticated,
            });
        }

        let manifest = ManifestParser::parse(&bytes).inspect_err(|e| {
            tracing::warn!(error = %e, "manifest rejected, keeping current catalog");
        })?;

        if let Err(e) = self.persist_manifest(&bytes) {
            tracing::warn!(error = %e, "failed to persist manifest, keeping current catalog");
            return Ok(partial(format!("failed to persist manifest: {}", e)));
        }

        let version = manifest.version.clone();
        let next = Catalog::new(manifest.records, bytes, manifest.version, Some(now));
        let diff = previous.diff(&next);
        let total_assets = next.len();
        self.catalog.replace(next);

        let duration_ms = elapsed_ms(&self.clock);
        tracing::info!(
            added = diff.added,
            removed = diff.removed,
            updated = diff.updated,
            total = total_assets,
            duration_ms,
            "catalog synchronized"
        );

        Ok(SyncResult {
            status: SyncStatus::Success,
            added: diff.added,
            removed: diff.removed,
            updated: diff.updated,
            total_assets,
            error: None,
            cache: self.cache.info(),
            synced_at: now,
            duration_ms,
            manifest_version: Some(version),
            authenticated,
        })
    }

    // ============ Cache Maintenance ============

    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    pub fn cleanup_cache(&self) -> Result<CleanupReport> {
        self.cache.cleanup()
    }

    /// Warm the cache for `names`, at most `max_concurrent_ops` fetches at a time
    ///
    /// Returns how many assets ended up cached; failures are only logged.
    pub async fn prefetch(&self, names: &[String], token: &CancellationToken) -> usize {
        if !self.config.prefetch_enabled {
            tracing::debug!("prefetch disabled");
            return 0;
        }

        let limit = self.config.max_concurrent_ops.max(1);
        let results: Vec<bool> = futures::stream::iter(names)
            .map(|name| async move {
                match self.get_asset(name, GetOptions::default(), token).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(name = %name, error = %e, "prefetch failed");
                        false
                    }
                }
            })
            .buffer_unordered(limit)
            .collect()
            .await;

        results.into_iter().filter(|ok| *ok).count()
    }

    /// Catalog and cache overview
    pub fn status(&self) -> ClientStatus {
        let catalog = self.catalog.snapshot();
        ClientStatus {
            repository_url: self.config.repository_url.clone(),
            branch: self.config.branch.clone(),
            backend: self.backend.name().to_string(),
            catalog_size: catalog.len(),
            catalog_version: catalog.version().to_string(),
            last_sync: catalog.last_sync(),
            manifest_path: self.manifest_path(),
            cache: self.cache.info(),
        }
    }
}

fn finish(
    mut content: AssetContent,
    catalog: &Catalog,
    name: &str,
    include_metadata: bool,
) -> AssetContent {
    if !include_metadata {
        content.metadata = None;
    } else if content.metadata.is_none() {
        content.metadata = catalog.get(name).cloned();
    }
    content
}

async fn file_modified(path: &Path) -> Option<DateTime<Utc>> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}
