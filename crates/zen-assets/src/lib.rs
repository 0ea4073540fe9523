//! Zen asset catalog
//!
//! This crate is the workspace side of the asset distribution pipeline:
//!
//! - **Catalog**: pulls `manifest.yaml` from a repository, validates it and
//!   answers filtered queries
//! - **Cache**: content-addressed on-disk store with TTL, LRU eviction and
//!   SHA-256 integrity checks
//! - **Backends**: cloned working trees and raw-content HTTPS APIs behind one
//!   [`RepoBackend`] trait
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use zen_assets::{AssetClient, AssetConfig, Filter, GetOptions, SyncRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AssetClient::builder(AssetConfig::default())
//!     .workspace(".")
//!     .build()?;
//! let token = CancellationToken::new();
//!
//! client.sync_repository(SyncRequest::default(), &token).await?;
//! let planning = client
//!     .list_assets(&Filter::new().category("planning"), &token)
//!     .await?;
//! for record in &planning.assets {
//!     let asset = client.get_asset(&record.name, GetOptions::default(), &token).await?;
//!     println!("{} {}", record.name, asset.checksum);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Credentials are never sent after cross-origin redirects
//! - Published checksums are verified before content reaches the cache

pub mod auth;
pub mod backend;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod manifest;
pub mod serializer;

// Re-exports for convenience
pub use auth::{AuthContext, EnvAuth, StaticAuth};
pub use backend::{
    InjectedFailure, MANIFEST_FILE, MemoryBackend, RepoBackend, WorkingTreeBackend, cancellable,
    create_backend,
};
pub use cache::{CacheConfig, CacheEntry, CacheInfo, CacheStore, CleanupReport, sanitize_key};
pub use catalog::{AssetList, Catalog, CatalogEngine, Filter, SyncDiff, filter_assets};
pub use client::{
    AssetClient, AssetClientBuilder, ClientMetrics, ClientStatus, GetOptions,
    LOCAL_MANIFEST_PATH, SyncRequest, SyncResult, SyncStatus,
};
pub use config::AssetConfig;
pub use credentials::{ResolvedCredentials, SecureHttpClient};
pub use error::{AssetError, ManifestIssue, Result};
pub use http::HttpBackend;
pub use manifest::{Manifest, ManifestParser};
pub use serializer::{IdentitySerializer, Serializer};
