//! # Consult Core Demo
//!
//! Wires the cache, optimizer, load balancer and monitor together against a
//! mock AI provider, runs a handful of chat turns and prints the resulting
//! performance report as JSON.
//!
//! Configuration is loaded the same way a service would load it: presets by
//! `CONSULT_ENV`, overridden by `CONSULT__*` environment variables.

use anyhow::Context;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use consult_core::cache::AnalysisCache;
use consult_core::config::{ConfigManager, ConsultantConfig};
use consult_core::constants::analysis_types;
use consult_core::load_balancer::SessionLoadBalancer;
use consult_core::logging::init_structured_logging;
use consult_core::metrics::MetricsAggregator;
use consult_core::monitoring::{LoggingAlertHandler, PerformanceMonitor};
use consult_core::optimizer::{OptimizationRequest, PerformanceOptimizer, RequestPriority};
use consult_core::test_utils::MockAiProvider;

const DEMO_TURNS: &[(&str, &str, &str)] = &[
    ("session-1", analysis_types::COST_ANALYSIS, "How can we reduce our monthly cloud bill?"),
    ("session-2", analysis_types::ARCHITECTURE_REVIEW, "Should the billing service be split out?"),
    ("session-3", analysis_types::SECURITY_REVIEW, "Is our token refresh flow safe?"),
    ("session-4", analysis_types::COST_ANALYSIS, "how can we reduce our   monthly cloud bill?"),
    ("session-1", analysis_types::PERFORMANCE_REVIEW, "Why is checkout slow at peak?"),
    ("session-5", analysis_types::ARCHITECTURE_REVIEW, "Should the billing service be split out?"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();

    let manager = ConfigManager::from_environment().context("loading configuration")?;
    let mut config = manager.config().clone();
    if config.load_balancer.consultants.is_empty() {
        config.load_balancer.consultants = ["alice", "bob", "carol"]
            .into_iter()
            .map(|id| ConsultantConfig {
                id: id.to_string(),
                capacity: None,
            })
            .collect();
    }
    config.log_configuration();

    let metrics = Arc::new(MetricsAggregator::new(config.monitoring.latency_window_size));
    let cache = Arc::new(AnalysisCache::new(config.cache.clone()));
    let provider = Arc::new(
        MockAiProvider::new("demo-model")
            .with_delay(Duration::from_millis(40))
            .with_default_text(
                "Findings:\n\n- Right-size the largest instances\n- Move batch jobs to spot capacity",
            ),
    );
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
    monitor.register_alert_handler("log", Arc::new(LoggingAlertHandler));

    let shutdown = CancellationToken::new();
    let cleanup = balancer.run_cleanup_loop(shutdown.clone());
    let monitoring = monitor.start_monitoring(shutdown.clone());

    for (session_id, analysis_type, content) in DEMO_TURNS {
        let consultant_id = balancer.assign_session(session_id, None)?;
        let request = OptimizationRequest::new(*session_id, *analysis_type, *content)
            .with_consultant(&consultant_id)
            .with_priority(RequestPriority::Normal);
        let result = optimizer.optimize(request).await?;
        balancer.touch_session(session_id)?;

        info!(
            session_id = %session_id,
            consultant_id = %consultant_id,
            cache_hit = result.cache_hit,
            response_ms = result.response_time.as_millis() as u64,
            "Chat turn completed"
        );
    }

    let strategy = balancer.optimize_for_response_time();
    info!(strategy = %strategy, "Strategy after response-time optimization");

    for (session_id, _, _) in DEMO_TURNS {
        // Sessions appear more than once; only the first release succeeds
        let _ = balancer.release_session(session_id);
    }

    let transitions = monitor.evaluate_alerts().await;

    let summary = json!({
        "environment": manager.environment(),
        "upstream_calls": provider.call_count(),
        "optimizer": optimizer.stats(),
        "cache": cache.statistics(),
        "load_balancer": balancer.metrics(),
        "report": monitor.report(),
        "alert_transitions": transitions,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    shutdown.cancel();
    cleanup.await.context("cleanup loop")?;
    monitoring.await.context("monitoring loop")?;
    Ok(())
}
