//! Content-addressed on-disk cache with TTL, LRU eviction and integrity checks
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/content/<sanitized_key>.cache   payloads
//! <base>/metadata/index.json             index, rewritten atomically on each mutation
//! ```
//!
//! A single lock guards the index. Payload I/O happens while holding it, so an
//! index entry always points at a payload of the recorded size.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use zen_core::{
    AssetContent, AssetRecord, SharedClock, checksum_matches, compute_checksum, ensure_dir,
    normalize_checksum, write_atomic,
};

use crate::config::AssetConfig;
use crate::error::{AssetError, Result};
use crate::serializer::{IdentitySerializer, Serializer};

const INDEX_VERSION: u32 = 1;
const CONTENT_DIR: &str = "content";
const METADATA_DIR: &str = "metadata";
const INDEX_FILE: &str = "index.json";
const PAYLOAD_EXT: &str = "cache";

/// Characters that never reach a payload file name
const UNSAFE_KEY_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Cache location and limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub base_path: PathBuf,
    /// Upper bound on the sum of payload sizes, in bytes
    pub size_limit: u64,
    /// TTL used by [`CacheStore::put`]; zero means never expire
    pub default_ttl: Duration,
}

impl CacheConfig {
    pub fn new(base_path: impl Into<PathBuf>, size_limit: u64, default_ttl: Duration) -> Self {
        Self {
            base_path: base_path.into(),
            size_limit,
            default_ttl,
        }
    }
}

impl From<&AssetConfig> for CacheConfig {
    fn from(config: &AssetConfig) -> Self {
        Self::new(
            config.expanded_cache_path(),
            config.cache_size_bytes(),
            config.default_ttl,
        )
    }
}

/// One cached payload as recorded in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Absolute payload path
    pub path: PathBuf,
    pub size: u64,
    /// `sha256:<hex>` of the cached content
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AssetRecord>,
}

impl CacheEntry {
    /// `ttl > 0 && now > created_at + ttl`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.ttl_seconds == 0 {
            return false;
        }
        let Some(ttl) = i64::try_from(self.ttl_seconds)
            .ok()
            .and_then(chrono::Duration::try_seconds)
        else {
            return false;
        };
        match self.created_at.checked_add_signed(ttl) {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }
}

#[derive(Deserialize)]
struct IndexFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    entries: &'a BTreeMap<String, CacheEntry>,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub total_size: u64,
    pub entry_count: usize,
    pub hit_ratio: f64,
    pub hits: u64,
    pub misses: u64,
    pub size_limit: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
}

/// What a [`CacheStore::cleanup`] sweep removed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub expired: usize,
    pub orphans: usize,
    pub evicted: usize,
}

#[derive(Debug, Default)]
struct CacheState {
    index: BTreeMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn total_size(&self) -> u64 {
        self.index.values().map(|e| e.size).sum()
    }
}

/// Replace path-significant characters and keep only a final file-name component
pub fn sanitize_key(key: &str) -> String {
    let replaced: String = key
        .chars()
        .map(|c| if UNSAFE_KEY_CHARS.contains(&c) { '_' } else { c })
        .collect();

    match Path::new(&replaced).file_name().and_then(|n| n.to_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "_".to_string(),
    }
}

/// On-disk key → content store
pub struct CacheStore {
    config: CacheConfig,
    clock: SharedClock,
    serializer: Arc<dyn Serializer>,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Open the cache, reloading and repairing the index
    pub fn open(config: CacheConfig, clock: SharedClock) -> Result<Self> {
        Self::open_with_serializer(config, clock, Arc::new(IdentitySerializer))
    }

    pub fn open_with_serializer(
        config: CacheConfig,
        clock: SharedClock,
        serializer: Arc<dyn Serializer>,
    ) -> Result<Self> {
        let store = Self {
            config,
            clock,
            serializer,
            state: Mutex::new(CacheState::default()),
        };

        ensure_dir(&store.content_dir())?;
        ensure_dir(&store.metadata_dir())?;

        let (index, dropped) = store.load_index();
        let mut state = store.lock();
        state.index = index;
        if dropped > 0 {
            tracing::warn!(dropped, "dropped cache entries with missing or truncated payloads");
            store.persist_or_warn(&state);
        }
        drop(state);

        Ok(store)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn content_dir(&self) -> PathBuf {
        self.config.base_path.join(CONTENT_DIR)
    }

    fn metadata_dir(&self) -> PathBuf {
        self.config.base_path.join(METADATA_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.metadata_dir().join(INDEX_FILE)
    }

    /// Payload file backing `key`; always directly under `<base>/content/`
    pub fn payload_path(&self, key: &str) -> PathBuf {
        self.content_dir()
            .join(format!("{}.{}", sanitize_key(key), PAYLOAD_EXT))
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_index(&self) -> (BTreeMap<String, CacheEntry>, usize) {
        let path = self.index_path();
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return (BTreeMap::new(), 0),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read cache index, starting fresh");
                return (BTreeMap::new(), 0);
            }
        };

        let file: IndexFile = match serde_json::from_slice(&raw) {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cache index corrupt, starting fresh");
                return (BTreeMap::new(), 0);
            }
        };

        let mut index = BTreeMap::new();
        let mut dropped = 0;
        for (key, mut entry) in file.entries {
            entry.key = key.clone();
            entry.path = self.payload_path(&key);
            match fs::metadata(&entry.path) {
                Ok(meta) if meta.is_file() && meta.len() == entry.size => {
                    index.insert(key, entry);
                }
                _ => dropped += 1,
            }
        }
        (index, dropped)
    }

    fn persist(&self, state: &CacheState) -> Result<()> {
        let file = IndexFileRef {
            version: INDEX_VERSION,
            entries: &state.index,
        };
        let data = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.index_path(), &data)?;
        Ok(())
    }

    fn persist_or_warn(&self, state: &CacheState) {
        if let Err(e) = self.persist(state) {
            tracing::warn!(error = %e, "failed to write cache index");
        }
    }

    fn remove_entry(&self, state: &mut CacheState, key: &str) -> Option<CacheEntry> {
        let entry = state.index.remove(key)?;
        if let Err(e) = fs::remove_file(&entry.path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(key, error = %e, "failed to remove cache payload");
        }
        Some(entry)
    }

    fn evict(&self, state: &mut CacheState, key: &str, reason: &str) {
        if self.remove_entry(state, key).is_some() {
            tracing::debug!(key, reason, "cache entry evicted");
            self.persist_or_warn(state);
        }
    }

    /// Evict least recently used entries until `incoming` more bytes fit
    fn evict_for(&self, state: &mut CacheState, incoming: u64) -> usize {
        let limit = self.config.size_limit;
        let mut total = state.total_size();
        if total.saturating_add(incoming) <= limit {
            return 0;
        }

        let mut order: Vec<(DateTime<Utc>, String)> = state
            .index
            .iter()
            .map(|(k, e)| (e.accessed_at, k.clone()))
            .collect();
        order.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

        let mut evicted = 0;
        for (_, key) in order {
            if total.saturating_add(incoming) <= limit {
                break;
            }
            if let Some(entry) = self.remove_entry(state, &key) {
                total = total.saturating_sub(entry.size);
                evicted += 1;
                tracing::debug!(key = %key, size = entry.size, "evicted least recently used entry");
            }
        }
        evicted
    }

    /// Look up `key`; expired or damaged entries are removed and reported as a miss
    ///
    /// With `verify`, the content checksum is recomputed and compared to the
    /// index; a mismatch removes the entry and returns
    /// [`AssetError::CacheCorrupted`].
    pub fn get(&self, key: &str, verify: bool) -> Result<Option<AssetContent>> {
        let mut state = self.lock();
        let now = self.clock.now();

        let Some(entry) = state.index.get(key).cloned() else {
            state.misses += 1;
            tracing::debug!(key, "cache miss");
            return Ok(None);
        };

        if entry.is_expired(now) {
            self.evict(&mut state, key, "expired");
            state.misses += 1;
            return Ok(None);
        }

        let bytes = match fs::read(&entry.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.evict(&mut state, key, "payload missing");
                state.misses += 1;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.len() as u64 != entry.size {
            self.evict(&mut state, key, "size mismatch");
            state.misses += 1;
            return Ok(None);
        }

        let mut content = self.serializer.deserialize(bytes, entry.metadata.clone())?;
        let actual = compute_checksum(&content.content);

        if verify && !entry.checksum.is_empty() && !checksum_matches(&entry.checksum, &actual) {
            self.evict(&mut state, key, "checksum mismatch");
            tracing::warn!(key, "cache entry failed integrity check");
            return Err(AssetError::CacheCorrupted {
                key: key.to_string(),
                expected: normalize_checksum(&entry.checksum),
                actual: normalize_checksum(&actual),
            });
        }

        content.checksum = actual;
        content.cached = true;
        content.cache_age_seconds = entry.age_seconds(now);

        if let Some(stored) = state.index.get_mut(key) {
            stored.accessed_at = now;
        }
        state.hits += 1;
        self.persist_or_warn(&state);

        tracing::debug!(key, age = content.cache_age_seconds, "cache hit");
        Ok(Some(content))
    }

    /// Store content under `key` with the default TTL
    pub fn put(&self, key: &str, content: &AssetContent) -> Result<()> {
        self.put_with_ttl(key, content, self.config.default_ttl)
    }

    /// Store content under `key`, evicting LRU entries first if needed
    pub fn put_with_ttl(&self, key: &str, content: &AssetContent, ttl: Duration) -> Result<()> {
        if key.trim().is_empty() {
            return Err(AssetError::KeyEmpty);
        }

        let data = self.serializer.serialize(content)?;
        let size = data.len() as u64;
        if size > self.config.size_limit {
            return Err(AssetError::EntryTooLarge {
                key: key.to_string(),
                size,
                limit: self.config.size_limit,
            });
        }

        let path = self.payload_path(key);
        let mut state = self.lock();
        let now = self.clock.now();

        // The index is only touched once the payload is on disk
        write_atomic(&path, &data)?;

        // Any entry backed by the overwritten file (this key, or another key
        // sanitizing to the same name) goes.
        let superseded: Vec<String> = state
            .index
            .iter()
            .filter(|(k, e)| k.as_str() == key || e.path == path)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &superseded {
            state.index.remove(k);
        }

        let evicted = self.evict_for(&mut state, size);
        state.index.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                path,
                size,
                checksum: compute_checksum(&content.content),
                created_at: now,
                accessed_at: now,
                ttl_seconds: ttl.as_secs(),
                metadata: content.metadata.clone(),
            },
        );
        self.persist(&state)?;

        tracing::debug!(key, size, evicted, "cache entry stored");
        Ok(())
    }

    /// Remove `key`; missing keys are ignored
    pub fn delete(&self, key: &str) {
        let mut state = self.lock();
        if self.remove_entry(&mut state, key).is_some() {
            self.persist_or_warn(&state);
        }
    }

    /// Remove every entry along with the cache directories
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        let removed = state.index.len();
        state.index.clear();
        state.hits = 0;
        state.misses = 0;

        remove_dir_all_if_exists(&self.content_dir())?;
        match fs::remove_file(self.index_path()) {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }
        remove_dir_if_empty(&self.metadata_dir());
        remove_dir_if_empty(&self.config.base_path);

        tracing::info!(removed, "cache cleared");
        Ok(())
    }

    /// Current statistics
    pub fn info(&self) -> CacheInfo {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        CacheInfo {
            total_size: state.total_size(),
            entry_count: state.index.len(),
            hit_ratio: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
            hits: state.hits,
            misses: state.misses,
            size_limit: self.config.size_limit,
            oldest_entry: state.index.values().map(|e| e.created_at).min(),
        }
    }

    /// Sweep expired entries, orphaned payload files and anything over the limit
    pub fn cleanup(&self) -> Result<CleanupReport> {
        let mut state = self.lock();
        let now = self.clock.now();
        let mut report = CleanupReport::default();

        let expired: Vec<String> = state
            .index
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            if self.remove_entry(&mut state, key).is_some() {
                report.expired += 1;
            }
        }

        let content_dir = self.content_dir();
        if content_dir.is_dir() {
            let referenced: HashSet<&Path> =
                state.index.values().map(|e| e.path.as_path()).collect();
            let mut orphans = Vec::new();
            for dirent in fs::read_dir(&content_dir)? {
                let path = dirent?.path();
                if path.is_file() && !referenced.contains(path.as_path()) {
                    orphans.push(path);
                }
            }
            for path in orphans {
                match fs::remove_file(&path) {
                    Ok(()) => report.orphans += 1,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove orphan")
                    }
                }
            }
        }

        report.evicted = self.evict_for(&mut state, 0);
        self.persist(&state)?;

        tracing::info!(
            expired = report.expired,
            orphans = report.orphans,
            evicted = report.evicted,
            "cache cleanup finished"
        );
        Ok(report)
    }

    /// True when `key` is present and unexpired
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.lock()
            .index
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Keys currently in the index
    pub fn keys(&self) -> Vec<String> {
        self.lock().index.keys().cloned().collect()
    }
}

fn remove_dir_all_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

fn remove_dir_if_empty(path: &Path) {
    // Fails harmlessly when the directory still has content
    let _ = fs::remove_dir(path);
}
