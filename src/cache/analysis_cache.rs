//! In-process analysis cache with quality-weighted eviction.

use opentelemetry::KeyValue;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::entry::{CacheEntry, StoredEntry};
use super::eviction::{select_victim, EvictionCandidate, EvictionWeights};
use super::fingerprint::{normalize_analysis_type, CacheKey};
use crate::config::CacheConfig;
use crate::constants::labels;
use crate::logging::log_cache_operation;
use crate::metrics::otel;

/// How long a request-path caller waits for the entry lock before giving up
const LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Derived cache statistics, computed on read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatistics {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0.0 before the first lookup
    pub hit_rate: f64,
    pub cache_size: usize,
    pub capacity: usize,
    /// Number of distinct analysis types currently cached
    pub analysis_types: usize,
    pub evictions: u64,
    pub expirations: u64,
    pub average_entry_age: Duration,
}

/// Quality-weighted cache of AI analysis outputs
///
/// All operations are non-fatal: when the entry lock cannot be taken within a
/// short bound a lookup degrades to a miss and a store is skipped, so the
/// request path never blocks on the cache.
#[derive(Debug)]
pub struct AnalysisCache {
    entries: RwLock<HashMap<CacheKey, StoredEntry>>,
    config: CacheConfig,
    epoch: Instant,
    sequence: AtomicU64,
    total_requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

enum LookupOutcome {
    Hit(CacheEntry),
    Expired,
    Miss,
}

impl AnalysisCache {
    /// Create a cache; seeds the warm set when `warm_on_startup` is set
    pub fn new(config: CacheConfig) -> Self {
        let cache = Self {
            entries: RwLock::new(HashMap::with_capacity(config.capacity.min(4096))),
            epoch: Instant::now(),
            sequence: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            config,
        };

        debug!(
            capacity = cache.config.capacity,
            max_entry_age_seconds = ?cache.config.max_entry_age_seconds,
            "Analysis cache created"
        );

        if cache.config.warm_on_startup {
            cache.warm();
        }

        cache
    }

    /// Convenience constructor for a cache with default weighting and no warm set
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(CacheConfig {
            capacity,
            warm_on_startup: false,
            warm_set: Vec::new(),
            max_entry_age_seconds: None,
            ..CacheConfig::default()
        })
    }

    pub(super) fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn is_expired(&self, entry: &StoredEntry, now_nanos: u64) -> bool {
        match self.config.max_entry_age() {
            Some(max_age) => {
                let age = now_nanos.saturating_sub(entry.created_nanos);
                u128::from(age) > max_age.as_nanos()
            }
            None => false,
        }
    }

    /// Look up a cached analysis; `None` is a miss
    pub fn lookup(&self, analysis_type: &str, content: &str) -> Option<CacheEntry> {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let key = CacheKey::new(analysis_type, content);
        let now = self.now_nanos();

        let outcome = match self.entries.try_read_for(LOCK_TIMEOUT) {
            Some(entries) => match entries.get(&key) {
                Some(stored) if self.is_expired(stored, now) => LookupOutcome::Expired,
                Some(stored) => {
                    stored.touch(now);
                    LookupOutcome::Hit(stored.snapshot(&key.analysis_type, &key.fingerprint))
                }
                None => LookupOutcome::Miss,
            },
            None => {
                warn!(
                    analysis_type = %key.analysis_type,
                    "Cache lock contended - degrading lookup to a miss"
                );
                LookupOutcome::Miss
            }
        };

        match outcome {
            LookupOutcome::Hit(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                otel::instruments()
                    .cache_hits_total
                    .add(1, &[KeyValue::new(labels::ANALYSIS_TYPE, key.analysis_type.clone())]);
                log_cache_operation("lookup", &key.analysis_type, Some(&key.fingerprint), "hit", None);
                Some(entry)
            }
            LookupOutcome::Expired => {
                self.remove_if_expired(&key);
                self.record_miss(&key);
                None
            }
            LookupOutcome::Miss => {
                self.record_miss(&key);
                None
            }
        }
    }

    fn record_miss(&self, key: &CacheKey) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        otel::instruments()
            .cache_misses_total
            .add(1, &[KeyValue::new(labels::ANALYSIS_TYPE, key.analysis_type.clone())]);
        log_cache_operation("lookup", &key.analysis_type, Some(&key.fingerprint), "miss", None);
    }

    fn remove_if_expired(&self, key: &CacheKey) {
        let Some(mut entries) = self.entries.try_write_for(LOCK_TIMEOUT) else {
            return;
        };
        let now = self.now_nanos();
        let expired = entries
            .get(key)
            .map(|stored| self.is_expired(stored, now))
            .unwrap_or(false);
        if expired {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            log_cache_operation("expire", &key.analysis_type, Some(&key.fingerprint), "removed", None);
        }
    }

    /// Insert a new analysis or refresh an existing one, evicting as needed.
    ///
    /// Returns `false` when the store was skipped because the cache was
    /// contended.
    pub fn store(
        &self,
        analysis_type: &str,
        content: &str,
        output: &str,
        tokens_used: u32,
        quality: f64,
    ) -> bool {
        let key = CacheKey::new(analysis_type, content);
        let quality = clamp_quality(quality);

        let Some(mut entries) = self.entries.try_write_for(LOCK_TIMEOUT) else {
            warn!(
                analysis_type = %key.analysis_type,
                "Cache lock contended - skipping store"
            );
            return false;
        };

        let now = self.now_nanos();
        let stale = entries
            .get(&key)
            .map(|stored| self.is_expired(stored, now))
            .unwrap_or(false);
        if stale {
            entries.remove(&key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }

        match entries.get_mut(&key) {
            Some(existing) => {
                existing.output = output.to_string();
                existing.tokens_used = tokens_used;
                existing.quality = quality;
                existing.touch(now);
                log_cache_operation("store", &key.analysis_type, Some(&key.fingerprint), "refreshed", None);
            }
            None => {
                let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
                entries.insert(
                    key.clone(),
                    StoredEntry::new(output.to_string(), tokens_used, quality, now, sequence),
                );
                log_cache_operation("store", &key.analysis_type, Some(&key.fingerprint), "inserted", None);
            }
        }

        while entries.len() > self.config.capacity {
            if !self.evict_one(&mut entries, &key, now) {
                break;
            }
        }

        true
    }

    /// Evict the lowest-scored entry other than `protected`. Returns whether
    /// anything was removed.
    fn evict_one(
        &self,
        entries: &mut HashMap<CacheKey, StoredEntry>,
        protected: &CacheKey,
        now_nanos: u64,
    ) -> bool {
        let only_entry = entries.len() == 1;
        let candidates: Vec<EvictionCandidate<&CacheKey>> = entries
            .iter()
            .filter(|(key, _)| only_entry || *key != protected)
            .map(|(key, stored)| EvictionCandidate {
                key,
                quality: stored.quality,
                last_accessed_nanos: stored.last_accessed_nanos(),
                access_count: stored.access_count(),
                sequence: stored.sequence,
            })
            .collect();

        let Some(victim) = select_victim(&self.config.eviction_weights, &candidates, now_nanos)
            .cloned()
        else {
            return false;
        };

        entries.remove(&victim);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        otel::instruments()
            .cache_evictions_total
            .add(1, &[KeyValue::new(labels::ANALYSIS_TYPE, victim.analysis_type.clone())]);
        log_cache_operation("evict", &victim.analysis_type, Some(&victim.fingerprint), "evicted", None);
        true
    }

    /// Evict the lowest-scored entry regardless of capacity
    pub fn evict(&self) -> bool {
        let Some(mut entries) = self.entries.try_write_for(LOCK_TIMEOUT) else {
            return false;
        };
        let now = self.now_nanos();
        let no_protection = CacheKey {
            analysis_type: String::new(),
            fingerprint: String::new(),
        };
        self.evict_one(&mut entries, &no_protection, now)
    }

    /// Remove a single analysis. Returns whether it was cached.
    pub fn invalidate(&self, analysis_type: &str, content: &str) -> bool {
        let key = CacheKey::new(analysis_type, content);
        self.entries.write().remove(&key).is_some()
    }

    /// Remove every analysis of one type. Returns how many were removed.
    pub fn invalidate_type(&self, analysis_type: &str) -> usize {
        let analysis_type = normalize_analysis_type(analysis_type);
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.analysis_type != analysis_type);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        if self.config.max_entry_age().is_none() {
            return 0;
        }
        let mut entries = self.entries.write();
        let now = self.now_nanos();
        let before = entries.len();
        entries.retain(|_, stored| !self.is_expired(stored, now));
        let removed = before - entries.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        if removed > 0 {
            debug!(removed = removed, "Purged expired cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn entries_for_type(&self, analysis_type: &str) -> usize {
        let analysis_type = normalize_analysis_type(analysis_type);
        self.entries
            .read()
            .keys()
            .filter(|key| key.analysis_type == analysis_type)
            .count()
    }

    pub fn statistics(&self) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let now = self.now_nanos();

        let (cache_size, analysis_types, total_age_nanos) = {
            let entries = self.entries.read();
            let types: HashSet<&str> = entries.keys().map(|k| k.analysis_type.as_str()).collect();
            let total_age: u128 = entries
                .values()
                .map(|stored| u128::from(now.saturating_sub(stored.created_nanos)))
                .sum();
            (entries.len(), types.len(), total_age)
        };

        let average_entry_age = if cache_size > 0 {
            let average = total_age_nanos / cache_size as u128;
            Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX))
        } else {
            Duration::ZERO
        };

        CacheStatistics {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            hits,
            misses,
            hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
            cache_size,
            capacity: self.config.capacity,
            analysis_types,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            average_entry_age,
        }
    }
}

fn clamp_quality(quality: f64) -> f64 {
    if quality.is_nan() {
        0.0
    } else {
        quality.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EvictionWeights;
    use std::sync::Arc;

    fn cache(capacity: usize) -> AnalysisCache {
        AnalysisCache::with_capacity(capacity)
    }

    #[test]
    fn test_store_then_lookup_round_trip() {
        let cache = cache(10);
        assert!(cache.store("cost_analysis", "What does it cost?", "About $40/month", 17, 0.8));

        let entry = cache.lookup("cost_analysis", "What does it cost?").unwrap();
        assert_eq!(entry.output, "About $40/month");
        assert_eq!(entry.tokens_used, 17);
        assert_eq!(entry.analysis_type, "cost_analysis");
        assert_eq!(entry.access_count, 2);
    }

    #[test]
    fn test_lookup_normalizes_content() {
        let cache = cache(10);
        cache.store("cost_analysis", "What does it cost?", "cheap", 1, 0.5);
        assert!(cache.lookup("cost_analysis", "  WHAT does   it cost?\n").is_some());
        assert!(cache.lookup("architecture_review", "What does it cost?").is_none());
    }

    #[test]
    fn test_store_refreshes_existing_entry() {
        let cache = cache(10);
        cache.store("cost_analysis", "q", "first", 1, 0.5);
        cache.store("cost_analysis", "Q", "second", 2, 0.7);

        assert_eq!(cache.len(), 1);
        let entry = cache.lookup("cost_analysis", "q").unwrap();
        assert_eq!(entry.output, "second");
        assert_eq!(entry.tokens_used, 2);
        assert_eq!(entry.access_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_quality_entry_is_evicted_first() {
        let cache = cache(2);
        cache.store("cost_analysis", "A", "a", 1, 0.9);
        cache.store("cost_analysis", "B", "b", 1, 0.2);
        cache.store("cost_analysis", "C", "c", 1, 0.95);

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("cost_analysis", "A").is_some());
        assert!(cache.lookup("cost_analysis", "B").is_none());
        assert!(cache.lookup("cost_analysis", "C").is_some());
        assert_eq!(cache.statistics().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_scores_evict_oldest_access() {
        let mut config = CacheConfig::for_test();
        config.capacity = 2;
        config.eviction_weights = EvictionWeights {
            quality: 1.0,
            recency: 0.0,
            frequency: 0.0,
        };
        let cache = AnalysisCache::new(config);

        cache.store("t", "first", "1", 1, 0.5);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.store("t", "second", "2", 1, 0.5);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.store("t", "third", "3", 1, 0.5);

        assert!(cache.lookup("t", "first").is_none());
        assert!(cache.lookup("t", "second").is_some());
        assert!(cache.lookup("t", "third").is_some());
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let cache = cache(5);
        for i in 0..50 {
            cache.store("general", &format!("question {i}"), "answer", 3, (i % 10) as f64 / 10.0);
            assert!(cache.len() <= 5);
        }
        assert_eq!(cache.statistics().evictions, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_misses() {
        let mut config = CacheConfig::for_test();
        config.max_entry_age_seconds = Some(60);
        let cache = AnalysisCache::new(config);

        cache.store("cost_analysis", "q", "a", 1, 0.9);
        cache.store("cost_analysis", "q2", "a", 1, 0.9);
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(cache.lookup("cost_analysis", "q").is_none());
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.statistics().expirations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restoring_expired_key_starts_a_fresh_entry() {
        let mut config = CacheConfig::for_test();
        config.max_entry_age_seconds = Some(60);
        let cache = AnalysisCache::new(config);

        assert!(cache.store("cost_analysis", "q", "old", 1, 0.9));
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cache.store("cost_analysis", "q", "fresh", 2, 0.9));

        let entry = cache.lookup("cost_analysis", "q").expect("re-stored entry is live");
        assert_eq!(entry.output, "fresh");
        assert_eq!(entry.tokens_used, 2);
        assert_eq!(cache.statistics().expirations, 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.lookup("cost_analysis", "q").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_store_and_lookup_respect_capacity() {
        let cache = Arc::new(cache(16));
        let mut handles = Vec::new();
        for worker in 0..8usize {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                for i in 0..300usize {
                    let content = format!("question {}", (worker * 7 + i) % 64);
                    let quality = ((worker + i) % 10) as f64 / 10.0;
                    cache.store("cost_analysis", &content, "answer", 5, quality);
                    cache.lookup("cost_analysis", &format!("question {}", (worker + i * 3) % 64));
                    assert!(cache.len() <= 16);
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = cache.statistics();
        assert!(stats.cache_size <= 16);
        assert_eq!(stats.total_requests, 8 * 300);
        assert_eq!(stats.hits + stats.misses, stats.total_requests);
    }

    #[test]
    fn test_statistics() {
        let cache = cache(10);
        cache.store("cost_analysis", "a", "x", 1, 0.5);
        cache.store("security_review", "b", "y", 1, 0.5);
        cache.lookup("cost_analysis", "a");
        cache.lookup("cost_analysis", "missing");
        cache.lookup("cost_analysis", "missing too");

        let stats = cache.statistics();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.cache_size, 2);
        assert_eq!(stats.analysis_types, 2);
        assert_eq!(stats.capacity, 10);
    }

    #[test]
    fn test_invalidation() {
        let cache = cache(10);
        cache.store("cost_analysis", "a", "x", 1, 0.5);
        cache.store("cost_analysis", "b", "x", 1, 0.5);
        cache.store("security_review", "c", "x", 1, 0.5);

        assert!(cache.invalidate("cost_analysis", "A "));
        assert!(!cache.invalidate("cost_analysis", "A "));
        assert_eq!(cache.entries_for_type("cost_analysis"), 1);
        assert_eq!(cache.invalidate_type("COST_ANALYSIS"), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_quality_is_clamped() {
        let cache = cache(10);
        cache.store("t", "hi", "x", 1, 3.0);
        cache.store("t", "lo", "x", 1, f64::NAN);
        assert_eq!(cache.lookup("t", "hi").unwrap().quality, 1.0);
        assert_eq!(cache.lookup("t", "lo").unwrap().quality, 0.0);
    }

    #[test]
    fn test_manual_evict() {
        let cache = cache(10);
        assert!(!cache.evict());
        cache.store("t", "keep", "x", 1, 0.9);
        cache.store("t", "drop", "x", 1, 0.1);
        assert!(cache.evict());
        assert!(cache.lookup("t", "keep").is_some());
        assert_eq!(cache.len(), 1);
    }
}
