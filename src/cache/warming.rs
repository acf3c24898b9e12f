//! Cache warming from the configured warm set.

use tracing::info;

use super::analysis_cache::AnalysisCache;
use crate::config::WarmEntry;

impl AnalysisCache {
    /// Seed the cache with the configured warm set. Returns how many entries
    /// were stored.
    pub fn warm(&self) -> usize {
        let warm_set = self.config().warm_set.clone();
        self.warm_with(&warm_set)
    }

    /// Seed the cache with `entries`, going through normal store semantics so
    /// capacity and eviction still apply.
    pub fn warm_with(&self, entries: &[WarmEntry]) -> usize {
        let stored = entries
            .iter()
            .filter(|entry| {
                self.store(
                    &entry.analysis_type,
                    &entry.content,
                    &entry.output,
                    entry.tokens_used,
                    entry.quality,
                )
            })
            .count();

        info!(
            requested = entries.len(),
            stored = stored,
            cache_size = self.len(),
            "Analysis cache warmed"
        );
        stored
    }
}
