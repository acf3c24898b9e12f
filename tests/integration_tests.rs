mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ConsultStack;
use consult_core::cache::AnalysisCache;
use consult_core::config::ConsultConfig;
use consult_core::constants::alert_rules;
use consult_core::load_balancer::{AssignmentStrategy, LoadBalancerError};
use consult_core::monitoring::{AlertRule, AlertSeverity, Comparator, MetricSelector};
use consult_core::optimizer::{OptimizationRequest, OptimizerError, ProviderError};
use consult_core::test_utils::{HandlerBehavior, MockAiProvider, RecordingAlertHandler};
use consult_core::ConsultError;
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_low_quality_analysis_evicted_at_capacity() {
    let cache = AnalysisCache::with_capacity(2);
    cache.store("cost_analysis", "A", "analysis a", 10, 0.9);
    cache.store("cost_analysis", "B", "analysis b", 10, 0.2);
    cache.store("cost_analysis", "C", "analysis c", 10, 0.95);

    assert!(cache.lookup("cost_analysis", "A").is_some());
    assert!(cache.lookup("cost_analysis", "B").is_none());
    assert!(cache.lookup("cost_analysis", "C").is_some());

    let stats = cache.statistics();
    assert_eq!(stats.cache_size, 2);
    assert_eq!(stats.evictions, 1);
}

#[tokio::test]
async fn test_saturated_pool_reports_failure_and_alerts() {
    let mut config = ConsultConfig::for_test();
    config.monitoring.install_default_rules = true;
    config.load_balancer.consultants = common::consultant_pool(&[("c-1", 2), ("c-2", 2), ("c-3", 2)]);
    let stack = ConsultStack::new(config, MockAiProvider::new("mock"));

    for i in 0..6 {
        assert_ok!(stack.balancer.assign_session(&format!("s-{i}"), None));
    }
    let loads: Vec<usize> = stack
        .balancer
        .consultants()
        .iter()
        .map(|c| c.current_sessions)
        .collect();
    assert_eq!(loads, vec![2, 2, 2]);

    let err: ConsultError = stack.balancer.assign_session("s-6", None).unwrap_err().into();
    assert!(err.is_user_visible());
    assert!(matches!(
        err,
        ConsultError::LoadBalancer(LoadBalancerError::NoAvailableConsultant { .. })
    ));

    let report = stack.monitor.report();
    assert_eq!(report.sessions.active_sessions, 6);
    assert_eq!(report.sessions.assignment_failures, 1);

    let transitions = stack.monitor.evaluate_alerts().await;
    assert!(transitions
        .iter()
        .any(|t| t.is_fired() && t.alert().rule_id == alert_rules::SESSION_ASSIGNMENT_FAILURES));
}

#[tokio::test]
async fn test_request_counting() {
    let stack = ConsultStack::for_test(&[]);
    let (n, m) = (20u64, 3u64);
    for i in 0..n {
        stack
            .monitor
            .record_request(i >= m, Duration::from_millis(10 + i));
    }

    let report = stack.monitor.report();
    assert_eq!(report.requests.total_requests, n);
    assert_eq!(report.requests.successful_requests, n - m);
    assert_eq!(report.requests.failed_requests, m);
    assert!((report.requests.error_rate - m as f64 / n as f64).abs() < 1e-9);
    assert_eq!(report.requests.window_samples, n as usize);
    assert!(report.requests.p50_latency_ms <= report.requests.p95_latency_ms);
    assert!(report.requests.p95_latency_ms <= report.requests.p99_latency_ms);
}

#[tokio::test]
async fn test_chat_turns_through_the_stack() {
    let stack = ConsultStack::for_test(&[("alice", 2), ("bob", 2)]);

    let alice_session = stack.balancer.assign_session("s-1", Some("alice")).unwrap();
    let other_session = stack.balancer.assign_session("s-2", None).unwrap();
    assert_eq!(alice_session, "alice");
    assert_eq!(other_session, "bob");

    let first = stack
        .optimizer
        .optimize(
            OptimizationRequest::new("s-1", "architecture_review", "Split the billing service?")
                .with_consultant(&alice_session),
        )
        .await
        .unwrap();
    let second = stack
        .optimizer
        .optimize(
            OptimizationRequest::new("s-2", "architecture_review", "split the billing   SERVICE?")
                .with_consultant(&other_session),
        )
        .await
        .unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(stack.provider.call_count(), 1);

    let report = stack.monitor.report();
    assert_eq!(report.requests.total_requests, 2);
    let cache = report.cache.expect("cache attached to monitor");
    assert_eq!(cache.hits, 1);
    assert_eq!(cache.misses, 1);
    assert_eq!(cache.size, 1);

    // alice has response-time telemetry from the upstream call
    assert_eq!(
        stack.balancer.optimize_for_response_time(),
        AssignmentStrategy::ResponseTimeWeighted
    );
}

#[tokio::test]
async fn test_upstream_failure_surfaces_as_consult_error() {
    let provider = MockAiProvider::new("flaky");
    provider.push_error(ProviderError::QuotaExceeded("daily limit".to_string()));
    let stack = ConsultStack::new(ConsultConfig::for_test(), provider);

    let result = stack
        .optimizer
        .optimize(OptimizationRequest::new("s-1", "cost_analysis", "What will this cost?"))
        .await;
    let err: ConsultError = result.unwrap_err().into();
    assert!(matches!(
        err,
        ConsultError::Optimizer(OptimizerError::UpstreamAIFailure { .. })
    ));
    assert!(err.to_string().contains("daily limit"));
    assert!(stack.cache.is_empty());
    assert_eq!(stack.monitor.report().requests.failed_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_alert_fires_at_most_once_per_cooldown() {
    let stack = ConsultStack::for_test(&[]);
    stack
        .monitor
        .register_rule(AlertRule::new(
            "slow",
            MetricSelector::P95LatencyMs,
            Comparator::GreaterThan,
            100.0,
            AlertSeverity::Warning,
            Duration::from_secs(30),
        ))
        .unwrap();
    let handler = Arc::new(RecordingAlertHandler::new());
    stack.monitor.register_alert_handler("recording", handler.clone());

    let shutdown = CancellationToken::new();
    let monitoring = stack.monitor.start_monitoring(shutdown.clone());

    // Breaching for 10 seconds, evaluated every second
    for _ in 0..10 {
        stack.monitor.record_request(true, Duration::from_millis(500));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(handler.count(), 1);
    assert_eq!(stack.monitor.active_alerts().len(), 1);

    shutdown.cancel();
    monitoring.await.unwrap();
    assert!(stack.monitor.evaluations() >= 9);
}

#[tokio::test(start_paused = true)]
async fn test_misbehaving_handlers_do_not_block_the_loop() {
    let stack = ConsultStack::for_test(&[]);
    stack
        .monitor
        .register_rule(AlertRule::new(
            "errors",
            MetricSelector::ErrorRate,
            Comparator::GreaterThan,
            0.05,
            AlertSeverity::Critical,
            Duration::ZERO,
        ))
        .unwrap();
    let panicking = Arc::new(RecordingAlertHandler::with_behavior(HandlerBehavior::Panic));
    let hanging = Arc::new(RecordingAlertHandler::with_behavior(HandlerBehavior::Hang));
    stack.monitor.register_alert_handler("panicking", panicking.clone());
    stack.monitor.register_alert_handler("hanging", hanging.clone());

    let shutdown = CancellationToken::new();
    let monitoring = stack.monitor.start_monitoring(shutdown.clone());

    stack.monitor.record_request(false, Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(panicking.count(), 1);
    assert_eq!(hanging.count(), 1);

    // resolve, then breach again: the loop keeps evaluating after the panic
    for _ in 0..50 {
        stack.monitor.record_request(true, Duration::from_millis(5));
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    for _ in 0..50 {
        stack.monitor.record_request(false, Duration::from_millis(5));
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(panicking.count(), 2);

    shutdown.cancel();
    monitoring.await.unwrap();
}

#[tokio::test]
async fn test_background_loops_stop_promptly_on_cancel() {
    let mut config = ConsultConfig::for_test();
    config.monitoring.evaluation_interval_seconds = 3600;
    config.load_balancer.cleanup_interval_seconds = 3600;
    let stack = ConsultStack::new(config, MockAiProvider::new("mock"));

    let shutdown = CancellationToken::new();
    let cleanup = stack.balancer.run_cleanup_loop(shutdown.clone());
    let monitoring = stack.monitor.start_monitoring(shutdown.clone());

    shutdown.cancel();
    let joined = tokio::time::timeout(Duration::from_secs(1), async {
        cleanup.await.unwrap();
        monitoring.await.unwrap();
    })
    .await;
    assert!(joined.is_ok(), "loops did not observe cancellation");
}

#[tokio::test(start_paused = true)]
async fn test_idle_sessions_released_by_cleanup_loop() {
    let stack = ConsultStack::for_test(&[("c-1", 3)]);
    stack.balancer.assign_session("idle", None).unwrap();
    stack.balancer.assign_session("active", None).unwrap();

    let shutdown = CancellationToken::new();
    let cleanup = stack.balancer.run_cleanup_loop(shutdown.clone());

    for _ in 0..7 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        stack.balancer.touch_session("active").unwrap();
    }

    assert!(stack.balancer.assignment("idle").is_none());
    assert!(stack.balancer.assignment("active").is_some());
    assert_eq!(stack.metrics.active_sessions(), 1);
    assert_eq!(
        stack.balancer.release_session("idle"),
        Err(LoadBalancerError::SessionNotAssigned {
            session_id: "idle".to_string()
        })
    );

    shutdown.cancel();
    cleanup.await.unwrap();
}
