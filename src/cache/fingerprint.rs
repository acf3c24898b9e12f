//! Content normalization and fingerprinting for cache keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Normalize request content so near-duplicate prompts share a key:
/// case-folded, trimmed, with runs of whitespace collapsed to one space.
pub fn normalize_content(content: &str) -> String {
    content
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 of the normalized content, hex encoded
pub fn fingerprint(content: &str) -> String {
    let normalized = normalize_content(content);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache key: a fingerprint scoped to its analysis type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub analysis_type: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(analysis_type: &str, content: &str) -> Self {
        Self {
            analysis_type: normalize_analysis_type(analysis_type),
            fingerprint: fingerprint(content),
        }
    }
}

pub(crate) fn normalize_analysis_type(analysis_type: &str) -> String {
    analysis_type.trim().to_lowercase()
}
