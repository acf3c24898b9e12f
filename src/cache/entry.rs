//! Cache entry types.
//!
//! [`StoredEntry`] is the cache-owned record; access bookkeeping uses atomics
//! so concurrent lookups only need the shared lock. [`CacheEntry`] is the
//! immutable snapshot handed to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a cached analysis returned by `lookup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub analysis_type: String,
    pub fingerprint: String,
    pub output: String,
    pub tokens_used: u32,
    /// Reusability estimate in [0, 1]
    pub quality: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
}

#[derive(Debug)]
pub(crate) struct StoredEntry {
    pub(crate) output: String,
    pub(crate) tokens_used: u32,
    pub(crate) quality: f64,
    pub(crate) created_at: DateTime<Utc>,
    /// Nanoseconds since the cache epoch
    pub(crate) created_nanos: u64,
    last_accessed_nanos: AtomicU64,
    access_count: AtomicU64,
    /// Insertion order, the final eviction tie-break
    pub(crate) sequence: u64,
}

impl StoredEntry {
    pub(crate) fn new(
        output: String,
        tokens_used: u32,
        quality: f64,
        now_nanos: u64,
        sequence: u64,
    ) -> Self {
        Self {
            output,
            tokens_used,
            quality,
            created_at: Utc::now(),
            created_nanos: now_nanos,
            last_accessed_nanos: AtomicU64::new(now_nanos),
            access_count: AtomicU64::new(1),
            sequence,
        }
    }

    /// Record an access at `now_nanos`
    pub(crate) fn touch(&self, now_nanos: u64) {
        self.last_accessed_nanos.fetch_max(now_nanos, Ordering::Relaxed);
        self.access_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn last_accessed_nanos(&self) -> u64 {
        self.last_accessed_nanos.load(Ordering::Relaxed)
    }

    pub(crate) fn access_count(&self) -> u64 {
        self.access_count.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self, analysis_type: &str, fingerprint: &str) -> CacheEntry {
        let since_creation = self.last_accessed_nanos().saturating_sub(self.created_nanos);
        let last_accessed_at = self.created_at
            + chrono::Duration::nanoseconds(i64::try_from(since_creation).unwrap_or(i64::MAX));

        CacheEntry {
            analysis_type: analysis_type.to_string(),
            fingerprint: fingerprint.to_string(),
            output: self.output.clone(),
            tokens_used: self.tokens_used,
            quality: self.quality,
            created_at: self.created_at,
            last_accessed_at,
            access_count: self.access_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_advances_access_bookkeeping() {
        let entry = StoredEntry::new("out".to_string(), 12, 0.5, 100, 0);
        entry.touch(250);
        entry.touch(200); // out-of-order access never moves time backwards

        assert_eq!(entry.access_count(), 3);
        assert_eq!(entry.last_accessed_nanos(), 250);

        let snapshot = entry.snapshot("cost_analysis", "abc");
        assert_eq!(snapshot.access_count, 3);
        assert_eq!(snapshot.tokens_used, 12);
        assert!(snapshot.last_accessed_at >= snapshot.created_at);
    }
}
