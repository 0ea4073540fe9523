//! In-memory cache of compiled templates
//!
//! One slot per template name. A slot is only reused while the content
//! checksum matches, so replacing a template upstream invalidates it.
//! Capacity overflow evicts the least recently accessed slot, breaking ties
//! by name in descending order.
//!
//! Every lookup bumps the slot's access time, so readers need `&mut` and the
//! engine guards the cache with a `Mutex` rather than a read-write lock.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use zen_core::SharedClock;

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct Slot<T> {
    checksum: String,
    value: Arc<T>,
    inserted: Instant,
    accessed: Instant,
}

/// Capacity and TTL bounded map from template name to compiled value
#[derive(Debug)]
pub struct CompiledCache<T> {
    slots: HashMap<String, Slot<T>>,
    capacity: usize,
    ttl: Duration,
    clock: SharedClock,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T> CompiledCache<T> {
    /// A zero `ttl` never expires
    pub fn new(capacity: usize, ttl: Duration, clock: SharedClock) -> Self {
        Self {
            slots: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
            clock,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Unexpired value cached under `name`, whatever its checksum
    pub fn get(&mut self, name: &str) -> Option<Arc<T>> {
        self.lookup(name, None, |_| true)
    }

    /// Unexpired value cached under `name` compiled from `checksum`
    pub fn get_matching(&mut self, name: &str, checksum: &str) -> Option<Arc<T>> {
        self.lookup(name, Some(checksum), |_| true)
    }

    /// Like [`get`](Self::get) and [`get_matching`](Self::get_matching), but a
    /// slot whose value `accept` rejects counts as a miss
    pub fn lookup(
        &mut self,
        name: &str,
        checksum: Option<&str>,
        accept: impl FnOnce(&T) -> bool,
    ) -> Option<Arc<T>> {
        let now = self.clock.instant();
        let ttl = self.ttl;

        let Some(slot) = self.slots.get_mut(name) else {
            self.misses += 1;
            return None;
        };

        if !ttl.is_zero() && now.saturating_duration_since(slot.inserted) >= ttl {
            tracing::debug!(template = name, "compiled template expired");
            self.slots.remove(name);
            self.misses += 1;
            return None;
        }
        if checksum.is_some_and(|c| c != slot.checksum) {
            tracing::debug!(template = name, "compiled template is stale");
            self.misses += 1;
            return None;
        }
        if !accept(&slot.value) {
            tracing::debug!(template = name, "compiled template has a different origin");
            self.misses += 1;
            return None;
        }

        slot.accessed = now;
        self.hits += 1;
        tracing::debug!(template = name, "compiled template cache hit");
        Some(Arc::clone(&slot.value))
    }

    /// Store `value`, replacing any slot with the same name
    pub fn insert(&mut self, name: &str, checksum: &str, value: Arc<T>) {
        let now = self.clock.instant();
        self.slots.remove(name);

        while self.slots.len() >= self.capacity {
            let Some(victim) = self
                .slots
                .iter()
                .min_by(|a, b| a.1.accessed.cmp(&b.1.accessed).then_with(|| b.0.cmp(a.0)))
                .map(|(name, _)| name.clone())
            else {
                break;
            };
            self.slots.remove(&victim);
            self.evictions += 1;
            tracing::debug!(template = %victim, "evicted compiled template");
        }

        self.slots.insert(
            name.to_string(),
            Slot {
                checksum: checksum.to_string(),
                value,
                inserted: now,
                accessed: now,
            },
        );
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.slots.len(),
            capacity: self.capacity,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}
