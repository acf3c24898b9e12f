//! Builders for wiring components together in integration tests

use std::sync::Arc;

use consult_core::cache::AnalysisCache;
use consult_core::config::{ConsultConfig, ConsultantConfig};
use consult_core::load_balancer::SessionLoadBalancer;
use consult_core::metrics::MetricsAggregator;
use consult_core::monitoring::PerformanceMonitor;
use consult_core::optimizer::PerformanceOptimizer;
use consult_core::test_utils::MockAiProvider;

/// Every component sharing one metrics aggregator, as a service would wire them
pub struct ConsultStack {
    pub config: ConsultConfig,
    pub metrics: Arc<MetricsAggregator>,
    pub cache: Arc<AnalysisCache>,
    pub provider: Arc<MockAiProvider>,
    pub optimizer: PerformanceOptimizer,
    pub balancer: Arc<SessionLoadBalancer>,
    pub monitor: Arc<PerformanceMonitor>,
}

impl ConsultStack {
    pub fn new(config: ConsultConfig, provider: MockAiProvider) -> Self {
        let metrics = Arc::new(MetricsAggregator::new(config.monitoring.latency_window_size));
        let cache = Arc::new(AnalysisCache::new(config.cache.clone()));
        let provider = Arc::new(provider);
        let optimizer = PerformanceOptimizer::new(
            cache.clone(),
            provider.clone(),
            metrics.clone(),
            config.optimizer.clone(),
        );
        let balancer = Arc::new(
            SessionLoadBalancer::new(config.load_balancer.clone()).with_metrics(metrics.clone()),
        );
        let monitor = Arc::new(PerformanceMonitor::new(config.monitoring.clone(), metrics.clone()));
        monitor.attach_cache(cache.clone());

        Self {
            config,
            metrics,
            cache,
            provider,
            optimizer,
            balancer,
            monitor,
        }
    }

    /// Test preset with `pool` consultants of the given capacities
    pub fn for_test(pool: &[(&str, usize)]) -> Self {
        let mut config = ConsultConfig::for_test();
        config.load_balancer.consultants = consultant_pool(pool);
        Self::new(config, MockAiProvider::new("mock"))
    }
}

pub fn consultant_pool(pool: &[(&str, usize)]) -> Vec<ConsultantConfig> {
    pool.iter()
        .map(|(id, capacity)| ConsultantConfig {
            id: (*id).to_string(),
            capacity: Some(*capacity),
        })
        .collect()
}
