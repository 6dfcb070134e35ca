use crate::clock::{Clock, SystemClock};
use crate::config::CacheSettings;
use crate::error::Result;
use crate::observability::get_metrics;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cache statistics for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub invalidations: AtomicU64,
    pub errors: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    pub fn get_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn get_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn get_invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    pub fn get_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: serde_json::Value,
    absolute_expiry: DateTime<Utc>,
    sliding: Option<chrono::Duration>,
    last_access: DateTime<Utc>,
}

impl CacheEntry {
    fn expires_at(&self) -> DateTime<Utc> {
        match self.sliding {
            Some(window) => self.absolute_expiry.min(self.last_access + window),
            None => self.absolute_expiry,
        }
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// In-process response cache with absolute and sliding expiry.
///
/// Values are stored as JSON so one cache can hold products and product pages
/// alike. The entry map is the only index: pattern invalidation scans it.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    settings: CacheSettings,
    stats: Arc<CacheStats>,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(settings: CacheSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            settings,
            stats: Arc::new(CacheStats::new()),
            clock,
        }
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> Arc<CacheStats> {
        self.stats.clone()
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `key`, evicting it if it has expired or no longer decodes as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.settings.enabled {
            return None;
        }

        let now = self.clock.now();
        let value = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired_at(now) => {
                entry.last_access = now;
                Some(entry.value.clone())
            }
            Some(_) => None,
            None => {
                self.stats.record_miss();
                get_metrics().record_cache_lookup(false);
                return None;
            }
        };

        let Some(value) = value else {
            self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
            self.stats.record_miss();
            get_metrics().record_cache_lookup(false);
            tracing::debug!(key = %key, "Cache entry expired");
            return None;
        };

        match serde_json::from_value::<T>(value) {
            Ok(decoded) => {
                self.stats.record_hit();
                get_metrics().record_cache_lookup(true);
                tracing::debug!(key = %key, "Cache hit");
                Some(decoded)
            }
            Err(e) => {
                self.stats.record_error();
                tracing::warn!(key = %key, "Failed to decode cached entry: {}", e);
                self.entries.remove(key);
                None
            }
        }
    }

    /// Stores `value` under `key` for at most `ttl`.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        if !self.settings.enabled {
            return Ok(());
        }

        let value = serde_json::to_value(value).map_err(|e| {
            self.stats.record_error();
            e
        })?;

        let now = self.clock.now();
        let ttl_chrono = to_chrono(ttl);
        let sliding = self
            .settings
            .sliding_ratio
            .filter(|ratio| *ratio > 0.0 && *ratio < 1.0)
            .map(|ratio| to_chrono(ttl.mul_f64(ratio)));

        if !self.entries.contains_key(key) && self.entries.len() >= self.settings.max_entries {
            self.make_room(now);
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                absolute_expiry: now + ttl_chrono,
                sliding,
                last_access: now,
            },
        );
        get_metrics().set_cache_entries(self.entries.len());

        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached response");
        Ok(())
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.record_invalidation();
        }
        removed
    }

    /// Removes every entry whose key contains `pattern`.
    pub fn remove_by_pattern(&self, pattern: &str) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|key, _| {
            if key.contains(pattern) {
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.stats.record_invalidation();
        }
        get_metrics().record_cache_invalidation(removed);
        tracing::debug!(pattern = %pattern, removed, "Invalidated cached responses");
        removed
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn make_room(&self, now: DateTime<Utc>) {
        let purged = self.purge_expired();
        if self.entries.len() < self.settings.max_entries {
            tracing::debug!(purged, "Purged expired entries to make room");
            return;
        }

        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at())
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            tracing::debug!(key = %key, at = %now, "Evicted entry closest to expiry");
        }
    }
}
