//! # Intelligent Analysis Cache
//!
//! Reuses previously generated AI analyses for near-duplicate requests.
//! Requests are keyed by analysis type plus a SHA-256 fingerprint of the
//! normalized content, and at capacity the entry with the lowest
//! quality/recency/frequency score is evicted.
//!
//! ```rust
//! use consult_core::cache::AnalysisCache;
//!
//! let cache = AnalysisCache::with_capacity(100);
//! cache.store("cost_analysis", "What will this cost?", "Roughly $40/month", 12, 0.8);
//! assert!(cache.lookup("cost_analysis", "what will   this cost?").is_some());
//! ```

mod analysis_cache;
mod entry;
mod eviction;
mod fingerprint;
mod warming;

pub use analysis_cache::{AnalysisCache, CacheStatistics};
pub use entry::CacheEntry;
pub use eviction::{select_victim, EvictionCandidate, EvictionWeights};
pub use fingerprint::{fingerprint, normalize_content, CacheKey};
