//! In-memory asset catalog and filtered queries
//!
//! The engine holds an `Arc<Catalog>` behind a reader/writer lock. Sync builds
//! a complete new catalog and swaps the pointer, so readers always see either
//! the old or the new catalog in full.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use zen_core::{AssetRecord, AssetType};

/// Page size used when a filter asks for zero items
pub const DEFAULT_LIMIT: usize = 50;

/// Maximum edit distance for "did you mean" suggestions
const SUGGESTION_DISTANCE: usize = 3;

/// An ordered, name-unique set of records plus the manifest bytes they came from
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<AssetRecord>,
    by_name: HashMap<String, usize>,
    last_sync: Option<DateTime<Utc>>,
    source_bytes: Vec<u8>,
    version: String,
}

impl Catalog {
    /// Build a catalog; later duplicates of a name are ignored
    pub fn new(
        records: Vec<AssetRecord>,
        source_bytes: Vec<u8>,
        version: impl Into<String>,
        last_sync: Option<DateTime<Utc>>,
    ) -> Self {
        let mut unique = Vec::with_capacity(records.len());
        let mut by_name = HashMap::with_capacity(records.len());
        for record in records {
            if by_name.contains_key(&record.name) {
                tracing::warn!(name = %record.name, "duplicate asset name ignored");
                continue;
            }
            by_name.insert(record.name.clone(), unique.len());
            unique.push(record);
        }

        Self {
            records: unique,
            by_name,
            last_sync,
            source_bytes,
            version: version.into(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AssetRecord> {
        self.by_name.get(name).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[AssetRecord] {
        &self.records
    }

    pub fn names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.last_sync
    }

    /// Exact manifest bytes this catalog was built from
    pub fn source_bytes(&self) -> &[u8] {
        &self.source_bytes
    }

    /// Manifest `version` string
    pub fn version(&self) -> &str {
        &self.version
    }

    /// A catalog has been loaded once it carries manifest bytes
    pub fn is_loaded(&self) -> bool {
        !self.source_bytes.is_empty()
    }

    /// Same records with a new sync timestamp
    pub fn with_last_sync(&self, at: DateTime<Utc>) -> Self {
        Self {
            last_sync: Some(at),
            ..self.clone()
        }
    }

    /// Name-keyed difference from `self` to `next`
    pub fn diff(&self, next: &Catalog) -> SyncDiff {
        let mut diff = SyncDiff::default();
        for record in &next.records {
            match self.get(&record.name) {
                None => diff.added += 1,
                Some(old) if old.checksum != record.checksum || old.updated_at != record.updated_at => {
                    diff.updated += 1
                }
                Some(_) => {}
            }
        }
        diff.removed = self
            .records
            .iter()
            .filter(|r| next.get(&r.name).is_none())
            .count();
        diff
    }

    /// Closest catalog name within a small edit distance
    pub fn suggest(&self, name: &str) -> Option<&str> {
        let needle = name.to_lowercase();
        self.records
            .iter()
            .map(|r| (strsim::levenshtein(&needle, &r.name.to_lowercase()), r.name.as_str()))
            .filter(|(distance, _)| *distance <= SUGGESTION_DISTANCE)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, name)| name)
    }

    /// Apply a filter to this catalog
    pub fn filter(&self, filter: &Filter) -> AssetList {
        filter_assets(&self.records, filter)
    }
}

/// Counts of changes between two catalogs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncDiff {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

/// Listing query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<AssetType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Every tag must be present on a record (case-insensitive)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Page size; zero means [`DEFAULT_LIMIT`]
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asset_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = Some(asset_type);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Page size after applying the default
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit
        }
    }

    /// Whether a record passes the type, category and tag predicates
    pub fn matches(&self, record: &AssetRecord) -> bool {
        if let Some(asset_type) = self.asset_type
            && record.asset_type != asset_type
        {
            return false;
        }
        if let Some(category) = self.category.as_deref()
            && !category.is_empty()
            && record.category != category
        {
            return false;
        }
        self.tags
            .iter()
            .filter(|t| !t.trim().is_empty())
            .all(|t| record.has_tag(t.trim()))
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetList {
    pub assets: Vec<AssetRecord>,
    /// Matches before pagination
    pub total: usize,
    pub has_more: bool,
    pub limit: usize,
    pub offset: usize,
}

/// Filter and paginate records, preserving catalog order
pub fn filter_assets(records: &[AssetRecord], filter: &Filter) -> AssetList {
    let matching: Vec<&AssetRecord> = records.iter().filter(|r| filter.matches(r)).collect();
    let total = matching.len();
    let limit = filter.effective_limit();
    let start = filter.offset.min(total);
    let end = start.saturating_add(limit).min(total);

    AssetList {
        assets: matching[start..end].iter().map(|r| (*r).clone()).collect(),
        total,
        has_more: end < total,
        limit,
        offset: filter.offset,
    }
}

/// Owner of the current catalog
#[derive(Debug, Default)]
pub struct CatalogEngine {
    current: RwLock<Arc<Catalog>>,
}

impl CatalogEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap handle to the current catalog
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new catalog, returning the previous one
    pub fn replace(&self, catalog: Catalog) -> Arc<Catalog> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(catalog))
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_loaded()
    }

    pub fn get(&self, name: &str) -> Option<AssetRecord> {
        self.snapshot().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().names()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.snapshot().last_sync()
    }

    pub fn list(&self, filter: &Filter) -> AssetList {
        self.snapshot().filter(filter)
    }

    pub fn suggest(&self, name: &str) -> Option<String> {
        self.snapshot().suggest(name).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, asset_type: AssetType, category: &str, tags: &[&str]) -> AssetRecord {
        let mut r = AssetRecord::new(name, format!("templates/{}.md", name));
        r.asset_type = asset_type;
        r.category = category.to_string();
        r.tags = tags.iter().map(|t| t.to_string()).collect();
        r
    }

    fn sample() -> Vec<AssetRecord> {
        vec![
            record("plan", AssetType::Template, "planning", &["strategy"]),
            record("api", AssetType::Template, "dev", &["api"]),
            record("ask", AssetType::Prompt, "planning", &["strategy"]),
        ]
    }

    #[test]
    fn test_filter_type_and_category() {
        let list = filter_assets(
            &sample(),
            &Filter::new()
                .asset_type(AssetType::Template)
                .category("planning"),
        );
        assert_eq!(list.total, 1);
        assert_eq!(list.assets[0].name, "plan");
        assert!(!list.has_more);
    }

    #[test]
    fn test_filter_all_tags_case_insensitive() {
        let mut records = sample();
        records[0].tags.push("Roadmap".to_string());

        let both = filter_assets(&records, &Filter::new().tag("STRATEGY").tag("roadmap"));
        assert_eq!(both.total, 1);
        assert_eq!(both.assets[0].name, "plan");

        let one = filter_assets(&records, &Filter::new().tag("strategy"));
        assert_eq!(one.total, 2);
    }

    #[test]
    fn test_empty_category_matches_all() {
        let list = filter_assets(&sample(), &Filter::new().category(""));
        assert_eq!(list.total, 3);
    }

    #[test]
    fn test_pagination() {
        let records: Vec<_> = (0..120)
            .map(|i| record(&format!("a{:03}", i), AssetType::Template, "c", &[]))
            .collect();

        let first = filter_assets(&records, &Filter::new());
        assert_eq!(first.limit, DEFAULT_LIMIT);
        assert_eq!(first.assets.len(), 50);
        assert_eq!(first.total, 120);
        assert!(first.has_more);

        let last = filter_assets(&records, &Filter::new().limit(50).offset(100));
        assert_eq!(last.assets.len(), 20);
        assert_eq!(last.assets[0].name, "a100");
        assert!(!last.has_more);

        let beyond = filter_assets(&records, &Filter::new().offset(500));
        assert!(beyond.assets.is_empty());
        assert_eq!(beyond.total, 120);
        assert!(!beyond.has_more);
    }

    #[test]
    fn test_filter_composition() {
        let records = sample();
        let f1 = Filter::new().category("planning").limit(1000);
        let f2 = Filter::new().tag("strategy").asset_type(AssetType::Prompt).limit(1000);
        let both = Filter {
            asset_type: f2.asset_type,
            category: f1.category.clone(),
            tags: f2.tags.clone(),
            limit: 1000,
            offset: 0,
        };

        let combined = filter_assets(&records, &both).assets;
        let staged = filter_assets(&filter_assets(&records, &f1).assets, &f2).assets;
        assert_eq!(combined, staged);

        for f in [&f1, &f2, &both] {
            assert!(filter_assets(&records, f).total <= records.len());
        }
    }

    #[test]
    fn test_diff_by_name() {
        let old = Catalog::new(sample(), b"v1".to_vec(), "1", None);

        let mut next_records = sample();
        next_records.remove(1);
        next_records[0].checksum = Some("sha256:new".to_string());
        next_records.push(record("new", AssetType::Schema, "dev", &[]));
        let next = Catalog::new(next_records, b"v2".to_vec(), "2", None);

        assert_eq!(
            old.diff(&next),
            SyncDiff {
                added: 1,
                removed: 1,
                updated: 1
            }
        );
    }

    #[test]
    fn test_suggest() {
        let catalog = Catalog::new(sample(), b"x".to_vec(), "1", None);
        assert_eq!(catalog.suggest("plam"), Some("plan"));
        assert_eq!(catalog.suggest("completely-different"), None);
    }

    #[test]
    fn test_duplicates_ignored() {
        let mut records = sample();
        records.push(record("plan", AssetType::Schema, "other", &[]));
        let catalog = Catalog::new(records, b"x".to_vec(), "1", None);
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("plan").unwrap().category, "planning");
    }

    #[test]
    fn test_engine_replace_is_atomic_swap() {
        let engine = CatalogEngine::new();
        assert!(!engine.is_loaded());

        let before = engine.snapshot();
        engine.replace(Catalog::new(sample(), b"x".to_vec(), "1", None));

        assert!(before.is_empty());
        assert!(engine.is_loaded());
        assert_eq!(engine.len(), 3);
        assert_eq!(engine.names(), vec!["plan", "api", "ask"]);
        assert_eq!(engine.get("api").unwrap().category, "dev");
    }
}
