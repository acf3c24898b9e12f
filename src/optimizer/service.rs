//! Cache-first request path in front of the upstream AI provider.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::errors::{OptimizerError, OptimizerResult};
use super::provider::{AiProvider, AiResponse};
use super::quality::estimate_quality;
use super::types::{OptimizationRequest, OptimizationResult, OptimizerStats};
use crate::cache::AnalysisCache;
use crate::config::OptimizerConfig;
use crate::logging::log_error;
use crate::metrics::MetricsAggregator;

/// Wraps every outbound AI request: cache first, upstream on a miss
pub struct PerformanceOptimizer {
    cache: Arc<AnalysisCache>,
    provider: Arc<dyn AiProvider>,
    metrics: Arc<MetricsAggregator>,
    config: OptimizerConfig,
    total_requests: AtomicU64,
    optimized_requests: AtomicU64,
    upstream_failures: AtomicU64,
    upstream_calls: AtomicU64,
    upstream_nanos: AtomicU64,
    in_flight: DashMap<String, usize>,
}

impl std::fmt::Debug for PerformanceOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceOptimizer")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("total_requests", &self.total_requests)
            .finish()
    }
}

/// Marks a session as having a request in flight until dropped
struct InFlightGuard<'a> {
    sessions: &'a DashMap<String, usize>,
    session_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn enter(sessions: &'a DashMap<String, usize>, session_id: &str) -> Self {
        *sessions.entry(session_id.to_string()).or_insert(0) += 1;
        Self {
            sessions,
            session_id: session_id.to_string(),
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.sessions.entry(self.session_id.clone()) {
            if *entry.get() <= 1 {
                entry.remove();
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }
}

impl PerformanceOptimizer {
    pub fn new(
        cache: Arc<AnalysisCache>,
        provider: Arc<dyn AiProvider>,
        metrics: Arc<MetricsAggregator>,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            cache,
            provider,
            metrics,
            config,
            total_requests: AtomicU64::new(0),
            optimized_requests: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            upstream_calls: AtomicU64::new(0),
            upstream_nanos: AtomicU64::new(0),
            in_flight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<AnalysisCache> {
        &self.cache
    }

    /// Serve a request from the cache, or call upstream and cache the answer.
    ///
    /// Upstream failures are returned as errors and nothing is cached for
    /// them. Every outcome is recorded into the metrics aggregator.
    pub async fn optimize(&self, request: OptimizationRequest) -> OptimizerResult<OptimizationResult> {
        let started = Instant::now();
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let _in_flight = InFlightGuard::enter(&self.in_flight, &request.session_id);

        debug!(
            session_id = %request.session_id,
            analysis_type = %request.analysis_type,
            priority = %request.priority,
            "Optimizing AI request"
        );

        if let Some(entry) = self.cache.lookup(&request.analysis_type, &request.content) {
            self.optimized_requests.fetch_add(1, Ordering::Relaxed);
            let response_time = started.elapsed();
            self.metrics.record_request(true, response_time);

            debug!(
                session_id = %request.session_id,
                analysis_type = %request.analysis_type,
                tokens_saved = entry.tokens_used,
                "Served request from analysis cache"
            );

            return Ok(OptimizationResult {
                cache_hit: true,
                optimized: true,
                response_time,
                content: entry.output,
                tokens_used: entry.tokens_used,
            });
        }

        let upstream_started = Instant::now();
        let outcome = self.call_upstream(&request).await;
        let upstream_elapsed = upstream_started.elapsed();

        match outcome {
            Ok(response) => {
                self.record_upstream_time(upstream_elapsed);
                if let Some(consultant_id) = &request.consultant_id {
                    self.metrics
                        .record_consultant_response_time(consultant_id, upstream_elapsed);
                }

                let quality = estimate_quality(&response.text);
                let tokens_used = response.total_tokens();
                if quality >= self.config.min_quality_to_cache {
                    self.cache.store(
                        &request.analysis_type,
                        &request.content,
                        &response.text,
                        tokens_used,
                        quality,
                    );
                } else {
                    debug!(
                        analysis_type = %request.analysis_type,
                        quality = quality,
                        min_quality = self.config.min_quality_to_cache,
                        "Upstream output below caching threshold"
                    );
                }

                let response_time = started.elapsed();
                self.metrics.record_request(true, response_time);
                info!(
                    session_id = %request.session_id,
                    analysis_type = %request.analysis_type,
                    provider = %self.provider.name(),
                    upstream_ms = upstream_elapsed.as_millis() as u64,
                    tokens_used = tokens_used,
                    "Upstream AI request completed"
                );

                Ok(OptimizationResult {
                    cache_hit: false,
                    optimized: false,
                    response_time,
                    content: response.text,
                    tokens_used,
                })
            }
            Err(error) => {
                self.upstream_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_request(false, started.elapsed());
                let context = format!("session_id={}", request.session_id);
                log_error("optimizer", "optimize", &error.to_string(), Some(&context));
                Err(error)
            }
        }
    }

    async fn call_upstream(&self, request: &OptimizationRequest) -> OptimizerResult<AiResponse> {
        let provider = self.provider.name().to_string();
        let generate = self
            .provider
            .generate(&request.prompt, request.max_tokens, request.temperature);

        let result = match self.config.request_timeout() {
            Some(limit) => match tokio::time::timeout(limit, generate).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        provider = %provider,
                        timeout_ms = limit.as_millis() as u64,
                        "Upstream AI request timed out"
                    );
                    return Err(OptimizerError::Timeout {
                        provider,
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => generate.await,
        };

        result.map_err(|e| OptimizerError::UpstreamAIFailure {
            provider,
            message: e.to_string(),
        })
    }

    fn record_upstream_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        self.upstream_nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    pub fn stats(&self) -> OptimizerStats {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let optimized_requests = self.optimized_requests.load(Ordering::Relaxed);
        let upstream_calls = self.upstream_calls.load(Ordering::Relaxed);

        OptimizerStats {
            total_requests,
            optimized_requests,
            cache_hit_rate: if total_requests > 0 {
                optimized_requests as f64 / total_requests as f64
            } else {
                0.0
            },
            active_sessions: self.in_flight.len(),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            average_upstream_time: if upstream_calls > 0 {
                Duration::from_nanos(self.upstream_nanos.load(Ordering::Relaxed) / upstream_calls)
            } else {
                Duration::ZERO
            },
        }
    }
}
