//! Quality-weighted eviction scoring.
//!
//! ```text
//! score = quality_weight   * quality
//!       + recency_weight   * (1 - idle / max_idle)
//!       + frequency_weight * (access_count / max_access_count)
//! ```
//!
//! `idle` is the time since the entry was last accessed; when every candidate
//! has been idle for the same time the recency term is 1.0 for all of them.
//! The lowest score is evicted; ties go to the least recently accessed entry,
//! then to the earliest inserted.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigResult, ConfigurationError};

/// Relative weight of each eviction signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvictionWeights {
    pub quality: f64,
    pub recency: f64,
    pub frequency: f64,
}

impl Default for EvictionWeights {
    fn default() -> Self {
        Self {
            quality: 0.6,
            recency: 0.3,
            frequency: 0.1,
        }
    }
}

impl EvictionWeights {
    pub fn validate(&self) -> ConfigResult<()> {
        for (field, value) in [
            ("cache.eviction_weights.quality", self.quality),
            ("cache.eviction_weights.recency", self.recency),
            ("cache.eviction_weights.frequency", self.frequency),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    value,
                    "weights must be finite and non-negative",
                ));
            }
        }
        if self.quality + self.recency + self.frequency <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "cache.eviction_weights",
                format!("{:?}", self),
                "at least one weight must be positive",
            ));
        }
        Ok(())
    }

    /// Score one candidate against the extremes of the current population
    pub fn score(
        &self,
        quality: f64,
        idle_nanos: u64,
        max_idle_nanos: u64,
        access_count: u64,
        max_access_count: u64,
    ) -> f64 {
        let recency = if max_idle_nanos == 0 {
            1.0
        } else {
            1.0 - idle_nanos as f64 / max_idle_nanos as f64
        };
        let frequency = if max_access_count == 0 {
            0.0
        } else {
            access_count as f64 / max_access_count as f64
        };

        self.quality * quality + self.recency * recency + self.frequency * frequency
    }
}

/// The data eviction needs about one entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvictionCandidate<K> {
    pub key: K,
    pub quality: f64,
    pub last_accessed_nanos: u64,
    pub access_count: u64,
    pub sequence: u64,
}

/// Pick the entry to evict, or `None` when there are no candidates
pub fn select_victim<K: Clone>(
    weights: &EvictionWeights,
    candidates: &[EvictionCandidate<K>],
    now_nanos: u64,
) -> Option<K> {
    let max_idle = candidates
        .iter()
        .map(|c| now_nanos.saturating_sub(c.last_accessed_nanos))
        .max()?;
    let max_access = candidates.iter().map(|c| c.access_count).max().unwrap_or(0);

    candidates
        .iter()
        .map(|c| {
            let idle = now_nanos.saturating_sub(c.last_accessed_nanos);
            let score = weights.score(c.quality, idle, max_idle, c.access_count, max_access);
            (score, c)
        })
        .min_by(|(score_a, a), (score_b, b)| {
            score_a
                .total_cmp(score_b)
                .then_with(|| a.last_accessed_nanos.cmp(&b.last_accessed_nanos))
                .then_with(|| a.sequence.cmp(&b.sequence))
        })
        .map(|(_, c)| c.key.clone())
}
