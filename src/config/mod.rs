//! # Consultation Core Configuration
//!
//! Configuration for every component of the performance layer, supplied once at
//! construction and never hot-reloaded.
//!
//! ## Architecture
//!
//! - **Presets per environment**: `for_test()`, `for_development()` and
//!   `Default` (production) mirror each other field by field
//! - **Layered loading**: [`ConfigManager`] merges a file and `CONSULT__*`
//!   environment overrides on top of a preset
//! - **Explicit validation**: [`ConsultConfig::validate`] rejects values that
//!   would make a component misbehave instead of silently clamping them
//!
//! ## Usage
//!
//! ```rust,no_run
//! use consult_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::from_environment()?;
//! let capacity = manager.config().cache.capacity;
//! let ttl = manager.config().load_balancer.session_idle_ttl();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

use crate::cache::EvictionWeights;
use crate::constants::{analysis_types, system::MIN_LOOP_INTERVAL};
use crate::load_balancer::AssignmentStrategy;
use crate::monitoring::AlertRule;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsultConfig {
    /// Analysis cache sizing, eviction weighting and warm set
    #[serde(default)]
    pub cache: CacheConfig,

    /// Consultant pool and session assignment settings
    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,

    /// Metrics windows, evaluation cadence and alert rules
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Upstream request handling
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl ConsultConfig {
    /// Configuration tuned for fast, deterministic tests
    pub fn for_test() -> Self {
        Self {
            cache: CacheConfig::for_test(),
            load_balancer: LoadBalancerConfig::for_test(),
            monitoring: MonitoringConfig::for_test(),
            optimizer: OptimizerConfig::for_test(),
        }
    }

    pub fn for_development() -> Self {
        Self {
            cache: CacheConfig::for_development(),
            load_balancer: LoadBalancerConfig::for_development(),
            monitoring: MonitoringConfig::for_development(),
            optimizer: OptimizerConfig::default(),
        }
    }

    /// Preset for a named environment
    pub fn for_environment(environment: &str) -> ConfigResult<Self> {
        match environment {
            "test" => Ok(Self::for_test()),
            "development" => Ok(Self::for_development()),
            "production" => Ok(Self::default()),
            other => Err(ConfigurationError::UnknownEnvironment {
                environment: other.to_string(),
            }),
        }
    }

    /// Validate every section
    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()?;
        self.load_balancer.validate()?;
        self.monitoring.validate()?;
        self.optimizer.validate()?;
        Ok(())
    }

    /// Log current configuration for debugging
    pub fn log_configuration(&self) {
        info!(
            capacity = self.cache.capacity,
            warm_entries = self.cache.warm_set.len(),
            max_entry_age_seconds = ?self.cache.max_entry_age_seconds,
            "Cache configuration"
        );
        info!(
            strategy = self.load_balancer.strategy.name(),
            consultants = self.load_balancer.consultants.len(),
            idle_ttl_seconds = self.load_balancer.session_idle_ttl_seconds,
            "Load balancer configuration"
        );
        info!(
            interval_seconds = self.monitoring.evaluation_interval_seconds,
            rules = self.monitoring.rules.len(),
            default_rules = self.monitoring.install_default_rules,
            "Monitoring configuration"
        );
    }
}

/// A single pre-computed analysis seeded into the cache by `warm()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmEntry {
    pub analysis_type: String,
    pub content: String,
    pub output: String,
    pub tokens_used: u32,
    pub quality: f64,
}

/// Analysis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries held across all analysis types
    pub capacity: usize,
    /// Entries older than this are treated as misses; `None` disables expiry
    pub max_entry_age_seconds: Option<u64>,
    /// Weighting used to score eviction candidates
    #[serde(default)]
    pub eviction_weights: EvictionWeights,
    /// Seed the cache from `warm_set` when it is constructed
    pub warm_on_startup: bool,
    #[serde(default)]
    pub warm_set: Vec<WarmEntry>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_entry_age_seconds: Some(24 * 60 * 60),
            eviction_weights: EvictionWeights::default(),
            warm_on_startup: true,
            warm_set: default_warm_set(),
        }
    }
}

impl CacheConfig {
    pub fn for_test() -> Self {
        Self {
            capacity: 100,
            max_entry_age_seconds: None,
            eviction_weights: EvictionWeights::default(),
            warm_on_startup: false,
            warm_set: Vec::new(),
        }
    }

    pub fn for_development() -> Self {
        Self {
            capacity: 200,
            max_entry_age_seconds: Some(60 * 60), // 1 hour for development
            ..Self::default()
        }
    }

    pub fn max_entry_age(&self) -> Option<Duration> {
        self.max_entry_age_seconds.map(Duration::from_secs)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.capacity",
                self.capacity,
                "capacity must be greater than 0",
            ));
        }

        self.eviction_weights.validate()?;

        for (index, entry) in self.warm_set.iter().enumerate() {
            if entry.analysis_type.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    format!("cache.warm_set[{index}].analysis_type"),
                    "cache warm set",
                ));
            }
            if !(0.0..=1.0).contains(&entry.quality) {
                return Err(ConfigurationError::invalid_value(
                    format!("cache.warm_set[{index}].quality"),
                    entry.quality,
                    "quality must be within [0, 1]",
                ));
            }
        }

        if self.warm_set.len() > self.capacity {
            warn!(
                warm_entries = self.warm_set.len(),
                capacity = self.capacity,
                "Warm set is larger than cache capacity - some entries will be evicted while warming"
            );
        }

        Ok(())
    }
}

/// Common analyses that every deployment sees early in the day
fn default_warm_set() -> Vec<WarmEntry> {
    vec![
        WarmEntry {
            analysis_type: analysis_types::COST_ANALYSIS.to_string(),
            content: "What are the main cost drivers of a small web application in the cloud?"
                .to_string(),
            output: "The main cost drivers are compute instances, managed databases, outbound \
                     data transfer and storage. Right-sizing instances and using reserved \
                     capacity typically yields the largest savings."
                .to_string(),
            tokens_used: 96,
            quality: 0.8,
        },
        WarmEntry {
            analysis_type: analysis_types::ARCHITECTURE_REVIEW.to_string(),
            content: "Should we split our monolith into microservices?".to_string(),
            output: "Split only along boundaries that change independently and have clear \
                     ownership. Start by modularising the monolith, then extract the modules \
                     with the highest scaling or deployment pressure."
                .to_string(),
            tokens_used: 88,
            quality: 0.8,
        },
        WarmEntry {
            analysis_type: analysis_types::SECURITY_REVIEW.to_string(),
            content: "What are the first security controls to put in place for a new service?"
                .to_string(),
            output: "Enforce authentication on every endpoint, keep secrets out of source \
                     control, enable TLS everywhere, apply least-privilege IAM roles and turn \
                     on audit logging."
                .to_string(),
            tokens_used: 79,
            quality: 0.75,
        },
    ]
}

/// Session load balancer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    /// Active selection strategy at construction
    pub strategy: AssignmentStrategy,
    /// Assignments idle for longer than this are released by the cleanup sweep
    pub session_idle_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    /// Capacity used when a consultant is registered without an explicit one
    pub default_consultant_capacity: usize,
    /// Consultants registered at construction
    #[serde(default)]
    pub consultants: Vec<ConsultantConfig>,
}

/// A consultant registered at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultantConfig {
    pub id: String,
    pub capacity: Option<usize>,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            strategy: AssignmentStrategy::LeastLoaded,
            session_idle_ttl_seconds: 30 * 60,
            cleanup_interval_seconds: 60,
            default_consultant_capacity: 5,
            consultants: Vec::new(),
        }
    }
}

impl LoadBalancerConfig {
    pub fn for_test() -> Self {
        Self {
            session_idle_ttl_seconds: 60,
            cleanup_interval_seconds: 1,
            default_consultant_capacity: 2,
            ..Self::default()
        }
    }

    pub fn for_development() -> Self {
        Self {
            session_idle_ttl_seconds: 5 * 60,
            cleanup_interval_seconds: 15,
            ..Self::default()
        }
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_ttl_seconds)
    }

    /// Cleanup loop period, at least [`MIN_LOOP_INTERVAL`]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds).max(MIN_LOOP_INTERVAL)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.session_idle_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "load_balancer.session_idle_ttl_seconds",
                0,
                "idle TTL must be greater than 0",
            ));
        }
        if self.cleanup_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "load_balancer.cleanup_interval_seconds",
                0,
                "cleanup interval must be greater than 0",
            ));
        }
        if self.default_consultant_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "load_balancer.default_consultant_capacity",
                0,
                "capacity must be greater than 0",
            ));
        }
        for consultant in &self.consultants {
            if consultant.id.trim().is_empty() {
                return Err(ConfigurationError::missing_required_field(
                    "load_balancer.consultants[].id",
                    "consultant pool",
                ));
            }
            if consultant.capacity == Some(0) {
                return Err(ConfigurationError::invalid_value(
                    format!("load_balancer.consultants[{}].capacity", consultant.id),
                    0,
                    "capacity must be greater than 0",
                ));
            }
        }
        Ok(())
    }
}

/// Performance monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub evaluation_interval_seconds: u64,
    /// Number of latency samples kept for percentile computation
    pub latency_window_size: usize,
    /// Upper bound on a single alert handler invocation
    pub handler_timeout_ms: u64,
    /// Number of fired/resolved alert instances retained
    pub alert_history_size: usize,
    /// Install the built-in rule set in addition to `rules`
    pub install_default_rules: bool,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_seconds: 30,
            latency_window_size: 1000,
            handler_timeout_ms: 5000,
            alert_history_size: 100,
            install_default_rules: true,
            rules: Vec::new(),
        }
    }
}

impl MonitoringConfig {
    pub fn for_test() -> Self {
        Self {
            evaluation_interval_seconds: 1,
            latency_window_size: 100,
            handler_timeout_ms: 200,
            alert_history_size: 20,
            install_default_rules: false,
            rules: Vec::new(),
        }
    }

    pub fn for_development() -> Self {
        Self {
            evaluation_interval_seconds: 10,
            ..Self::default()
        }
    }

    /// Evaluation loop period, at least [`MIN_LOOP_INTERVAL`]
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_seconds).max(MIN_LOOP_INTERVAL)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.evaluation_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitoring.evaluation_interval_seconds",
                0,
                "evaluation interval must be greater than 0",
            ));
        }
        if self.latency_window_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitoring.latency_window_size",
                0,
                "latency window must hold at least one sample",
            ));
        }
        if self.handler_timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "monitoring.handler_timeout_ms",
                0,
                "handler timeout must be greater than 0",
            ));
        }
        for rule in &self.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

/// Performance optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Upstream outputs scored below this are returned but not cached
    pub min_quality_to_cache: f64,
    /// Upper bound on a single upstream call; `None` waits indefinitely
    pub request_timeout_ms: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_quality_to_cache: 0.3,
            request_timeout_ms: Some(30_000),
        }
    }
}

impl OptimizerConfig {
    pub fn for_test() -> Self {
        Self {
            min_quality_to_cache: 0.0,
            request_timeout_ms: Some(1_000),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(0.0..=1.0).contains(&self.min_quality_to_cache) {
            return Err(ConfigurationError::invalid_value(
                "optimizer.min_quality_to_cache",
                self.min_quality_to_cache,
                "quality threshold must be within [0, 1]",
            ));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "optimizer.request_timeout_ms",
                0,
                "timeout must be greater than 0 when set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        ConsultConfig::default().validate().unwrap();
        ConsultConfig::for_test().validate().unwrap();
        ConsultConfig::for_development().validate().unwrap();
    }

    #[test]
    fn test_for_environment_rejects_unknown() {
        assert!(ConsultConfig::for_environment("staging").is_err());
        assert_eq!(
            ConsultConfig::for_environment("test").unwrap().cache.capacity,
            CacheConfig::for_test().capacity
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = ConsultConfig::for_test();
        config.cache.capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.capacity"));
    }

    #[test]
    fn test_warm_entry_quality_out_of_range_rejected() {
        let mut config = CacheConfig::for_test();
        config.warm_set.push(WarmEntry {
            analysis_type: "cost_analysis".to_string(),
            content: "q".to_string(),
            output: "a".to_string(),
            tokens_used: 1,
            quality: 1.5,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_warm_set_is_valid() {
        let config = CacheConfig::default();
        assert!(!config.warm_set.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_duration_helpers() {
        let config = ConsultConfig::for_test();
        assert_eq!(config.monitoring.handler_timeout(), Duration::from_millis(200));
        assert_eq!(config.load_balancer.cleanup_interval(), Duration::from_secs(1));
        assert_eq!(config.cache.max_entry_age(), None);
    }

    #[test]
    fn test_zero_loop_intervals_clamped() {
        let mut config = ConsultConfig::for_test();
        config.monitoring.evaluation_interval_seconds = 0;
        config.load_balancer.cleanup_interval_seconds = 0;

        assert!(config.validate().is_err());
        assert_eq!(config.monitoring.evaluation_interval(), MIN_LOOP_INTERVAL);
        assert_eq!(config.load_balancer.cleanup_interval(), MIN_LOOP_INTERVAL);
    }
}
