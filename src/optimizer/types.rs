//! Request, result and statistics types for the optimizer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Scheduling hint carried with each request. Logged, never changes results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl fmt::Display for RequestPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestPriority::Low => "low",
            RequestPriority::Normal => "normal",
            RequestPriority::High => "high",
            RequestPriority::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// One outbound AI request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub session_id: String,
    /// Consultant handling the session, when one has been assigned
    pub consultant_id: Option<String>,
    pub analysis_type: String,
    /// Content the cache key is derived from
    pub content: String,
    /// Full prompt sent upstream on a miss
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub priority: RequestPriority,
}

impl OptimizationRequest {
    /// Request whose prompt is the content itself, with default sampling
    pub fn new(
        session_id: impl Into<String>,
        analysis_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            session_id: session_id.into(),
            consultant_id: None,
            analysis_type: analysis_type.into(),
            prompt: content.clone(),
            content,
            max_tokens: 1024,
            temperature: 0.7,
            priority: RequestPriority::Normal,
        }
    }

    pub fn with_consultant(mut self, consultant_id: impl Into<String>) -> Self {
        self.consultant_id = Some(consultant_id.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_priority(mut self, priority: RequestPriority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub cache_hit: bool,
    /// True when the upstream call was avoided
    pub optimized: bool,
    pub response_time: Duration,
    pub content: String,
    pub tokens_used: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerStats {
    pub total_requests: u64,
    pub optimized_requests: u64,
    /// optimized_requests / total_requests, 0.0 before the first request
    pub cache_hit_rate: f64,
    /// Sessions with at least one request currently in flight
    pub active_sessions: usize,
    pub upstream_failures: u64,
    pub average_upstream_time: Duration,
}
