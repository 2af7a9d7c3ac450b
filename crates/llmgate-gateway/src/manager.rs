//! The failover orchestrator — sole entry point for generation requests.
//!
//! `generate()` walks the candidate list (primary, then fallbacks) for up to
//! `max_retries` rounds. Per candidate it estimates cost, consults the cost
//! breaker (refusal means no network call), consults the health breaker and
//! the cached health check, adapts parameters for the chosen model, and
//! invokes the provider under a timeout. The first success wins; every
//! failure kind is absorbed here, and only full exhaustion surfaces as a
//! single [`TerminalError`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use llmgate_core::config::GatewayConfig;
use llmgate_core::{
    AdaptedRequest, GateError, GenerationRequest, GenerationResponse, ProviderError,
    ProviderUsage, TerminalError,
};
use llmgate_providers::catalog::{Capability, ModelCatalog};
use llmgate_providers::registry::ProviderRegistry;
use llmgate_providers::traits::Provider;

use crate::cost::{CostBreaker, CostSummary};
use crate::health::HealthBreaker;
use crate::monitor::{Alert, AlertChannel, AlertSeverity, GatewaySnapshot, Monitor};
use crate::store::{CostStore, FileCostStore, MemoryCostStore};

// ─────────────────────────────────────────────
// Introspection types
// ─────────────────────────────────────────────

/// Breaker view of one provider, for `health_status()`.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub circuit_open: bool,
    pub consecutive_failures: u32,
}

/// Aggregate health view: breaker states plus recent alert counts.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealthStatus {
    pub providers: HashMap<String, ProviderHealth>,
    pub alert_counts: HashMap<AlertSeverity, usize>,
}

// ─────────────────────────────────────────────
// Capability inference
// ─────────────────────────────────────────────

/// Derive the capabilities a request needs from its flags and attachments.
pub(crate) fn infer_required_capabilities(request: &GenerationRequest) -> HashSet<Capability> {
    let mut required = HashSet::new();
    if request.json_mode {
        required.insert(Capability::JsonMode);
    }
    if request.streaming {
        required.insert(Capability::Streaming);
    }
    if request.schema_ref.is_some() {
        required.insert(Capability::StructuredOutput);
    }
    if !request.attachments.is_empty() {
        required.insert(Capability::Vision);
    }
    required
}

// ─────────────────────────────────────────────
// GatewayManager
// ─────────────────────────────────────────────

/// Orchestrates providers, breakers, catalog, and monitor behind one
/// `generate()` surface. Cheap to share behind an `Arc`; every call is an
/// independent logical flow.
pub struct GatewayManager {
    config: GatewayConfig,
    registry: Arc<ProviderRegistry>,
    catalog: Arc<ModelCatalog>,
    health: HealthBreaker,
    cost: CostBreaker,
    monitor: Monitor,
    usage: Mutex<HashMap<String, ProviderUsage>>,
    /// Cached health-check results, staleness bounded only by the TTL.
    health_cache: Mutex<HashMap<String, (Instant, bool)>>,
    // Interval counters drained by each monitoring sweep.
    successes: AtomicU64,
    failures: AtomicU64,
    latency_total_ms: AtomicU64,
    rate_limit_hits: AtomicU32,
}

impl GatewayManager {
    /// Create a manager. The cost store comes from `config.cost.state_path`:
    /// a file-backed store when set, in-memory otherwise.
    pub fn new(
        config: GatewayConfig,
        registry: Arc<ProviderRegistry>,
        catalog: Arc<ModelCatalog>,
    ) -> Self {
        let store: Arc<dyn CostStore> = if config.cost.state_path.is_empty() {
            Arc::new(MemoryCostStore::new())
        } else {
            Arc::new(FileCostStore::new(config.cost.state_path.clone()))
        };
        Self::with_store(config, registry, catalog, store, Vec::new())
    }

    /// Create a manager with an explicit cost store and alert channels.
    pub fn with_store(
        config: GatewayConfig,
        registry: Arc<ProviderRegistry>,
        catalog: Arc<ModelCatalog>,
        store: Arc<dyn CostStore>,
        channels: Vec<Arc<dyn AlertChannel>>,
    ) -> Self {
        let health = HealthBreaker::new(
            config.breaker.failure_threshold,
            Duration::from_secs(config.breaker.cooldown_secs),
        );
        let cost = CostBreaker::new(config.cost.clone(), store);
        let monitor = Monitor::new(config.alerts.clone(), channels);
        Self {
            config,
            registry,
            catalog,
            health,
            cost,
            monitor,
            usage: Mutex::new(HashMap::new()),
            health_cache: Mutex::new(HashMap::new()),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latency_total_ms: AtomicU64::new(0),
            rate_limit_hits: AtomicU32::new(0),
        }
    }

    // ── Candidate selection ──

    /// Primary-then-fallbacks, filtered to providers with a catalogued model
    /// that satisfies the request. An empty filter result falls back to the
    /// full list rather than refusing outright.
    fn order_candidates(
        &self,
        required: &HashSet<Capability>,
        context_tokens: u32,
    ) -> Vec<String> {
        let order = self.config.candidate_order();
        let filtered: Vec<String> = order
            .iter()
            .filter(|name| {
                self.registry.get(name).is_some()
                    && self
                        .catalog
                        .cheapest_for(name, required, context_tokens)
                        .is_some()
            })
            .cloned()
            .collect();

        if filtered.is_empty() {
            warn!(
                required = ?required,
                context_tokens,
                "No candidate satisfies the request requirements, trying the full list"
            );
            order
        } else {
            filtered
        }
    }

    /// Pick the model one candidate will serve this request with.
    fn model_for(
        &self,
        provider_name: &str,
        provider: &dyn Provider,
        request: &GenerationRequest,
        required: &HashSet<Capability>,
        context_tokens: u32,
    ) -> Option<String> {
        if let Some(model) = &request.model {
            self.catalog.ensure_registered(provider_name, model);
            return Some(model.clone());
        }
        if let Some(descriptor) = self.catalog.cheapest_for(provider_name, required, context_tokens)
        {
            return Some(descriptor.id);
        }
        let models = provider.list_models();
        let first = models.first()?;
        self.catalog.ensure_registered(provider_name, first);
        Some(first.clone())
    }

    // ── Health checking ──

    /// Fresh check on the first round; cached result (bounded by the TTL)
    /// afterwards. Expiry of the per-check timeout counts as unhealthy.
    async fn provider_healthy(&self, name: &str, provider: &Arc<dyn Provider>, round: u32) -> bool {
        let ttl = Duration::from_secs(self.config.health_cache_ttl_secs);
        if round > 0 {
            let cache = self.health_cache.lock().expect("health cache poisoned");
            if let Some((at, healthy)) = cache.get(name) {
                if at.elapsed() < ttl {
                    return *healthy;
                }
            }
        }

        let check_timeout = Duration::from_secs(self.config.health_check_timeout_secs);
        let healthy = tokio::time::timeout(check_timeout, provider.health_check())
            .await
            .unwrap_or_else(|_| {
                warn!(provider = name, "Health check timed out");
                false
            });

        self.health_cache
            .lock()
            .expect("health cache poisoned")
            .insert(name.to_string(), (Instant::now(), healthy));
        healthy
    }

    // ── Entry point ──

    /// Generate a completion, failing over across providers as needed.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, TerminalError> {
        let required = infer_required_capabilities(request);
        let context_tokens = request.estimated_tokens();
        let candidates = self.order_candidates(&required, context_tokens);

        debug!(
            candidates = ?candidates,
            required = ?required,
            context_tokens,
            "Starting generation"
        );

        let mut providers_tried: Vec<String> = Vec::new();
        let mut attempts: u32 = 0;
        let mut last_error = "no candidate was attempted".to_string();
        let rounds = self.config.max_retries.max(1);

        for round in 0..rounds {
            for name in &candidates {
                let Some(provider) = self.registry.get(name) else {
                    debug!(provider = %name, "Candidate not registered, skipping");
                    continue;
                };
                if !providers_tried.contains(name) {
                    providers_tried.push(name.clone());
                }

                let Some(model) =
                    self.model_for(name, provider.as_ref(), request, &required, context_tokens)
                else {
                    warn!(provider = %name, "Candidate serves no models, skipping");
                    continue;
                };

                // Admission control happens strictly before any network call.
                let estimated = provider.estimate_cost(context_tokens, &model);
                let (allowed, reason) = self.cost.check_request_allowed(estimated, name);
                if !allowed {
                    debug!(provider = %name, %reason, "Cost breaker refused candidate");
                    last_error = GateError::BudgetExceeded(reason).to_string();
                    continue;
                }

                if !self.health.can_attempt(name) {
                    debug!(provider = %name, "Health circuit open, skipping candidate");
                    last_error = GateError::CircuitOpen(name.clone()).to_string();
                    continue;
                }

                if !self.provider_healthy(name, &provider, round).await {
                    self.health.record_failure(name);
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    last_error = format!("provider '{name}' failed health check");
                    continue;
                }

                let adapted = AdaptedRequest {
                    system_prompt: request.system_prompt.clone(),
                    user_prompt: request.user_prompt.clone(),
                    model: model.clone(),
                    params: self.catalog.adapt_parameters(name, &model, &request.wire_params()),
                    metadata: request.metadata.clone(),
                };

                attempts += 1;
                let started = Instant::now();
                let request_timeout = Duration::from_secs(self.config.request_timeout_secs);
                let outcome = tokio::time::timeout(request_timeout, provider.generate(&adapted))
                    .await
                    .unwrap_or_else(|_| {
                        Err(ProviderError::TransientUnavailable(format!(
                            "request to '{name}' timed out after {}s",
                            self.config.request_timeout_secs
                        )))
                    });
                let latency_ms = started.elapsed().as_millis() as u64;

                match outcome {
                    Ok(completion) => {
                        let actual_cost = provider.estimate_cost(completion.tokens_used, &model);
                        self.cost.record_request(actual_cost, name);
                        self.cost.record_success();
                        self.health.record_success(name);
                        self.usage
                            .lock()
                            .expect("usage lock poisoned")
                            .entry(name.clone())
                            .or_default()
                            .record(completion.tokens_used, actual_cost);
                        self.successes.fetch_add(1, Ordering::Relaxed);
                        self.latency_total_ms.fetch_add(latency_ms, Ordering::Relaxed);

                        info!(
                            provider = %name,
                            model = %completion.model,
                            tokens = completion.tokens_used,
                            cost = actual_cost,
                            latency_ms,
                            "Generation succeeded"
                        );
                        return Ok(GenerationResponse {
                            content: completion.content,
                            provider: name.clone(),
                            model: completion.model,
                            tokens_used: completion.tokens_used,
                            cost: actual_cost,
                            latency_ms,
                            timestamp: Utc::now(),
                            metadata: request.metadata.clone(),
                        });
                    }
                    Err(ProviderError::RateLimited(msg)) => {
                        // Counted for monitoring only; no health failure, no
                        // same-provider retry this round.
                        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(provider = %name, %msg, "Rate limited, failing over");
                        last_error = format!("{name}: rate limited: {msg}");
                    }
                    Err(e) => {
                        self.health.record_failure(name);
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        warn!(provider = %name, error = %e, "Provider attempt failed");
                        last_error = format!("{name}: {}", GateError::from(e));
                    }
                }
            }

            self.cost.record_failure(&last_error);
            if round + 1 < rounds {
                let delay = self.config.base_retry_delay_ms * 2u64.pow(round);
                debug!(round, delay_ms = delay, "Round exhausted, backing off");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(TerminalError {
            providers_tried,
            attempts,
            last_error,
        })
    }

    // ── Monitoring ──

    /// Run one monitoring sweep: fan out health checks, drain the interval
    /// counters, and feed the snapshot to the monitor. Returns dispatched
    /// alerts.
    pub async fn monitoring_sweep(&self) -> Vec<Alert> {
        let check_timeout = Duration::from_secs(self.config.health_check_timeout_secs);
        let provider_health = self.registry.health_sweep(check_timeout).await;

        let successes = self.successes.swap(0, Ordering::Relaxed);
        let failures = self.failures.swap(0, Ordering::Relaxed);
        let latency_total = self.latency_total_ms.swap(0, Ordering::Relaxed);
        let rate_limit_hits = self.rate_limit_hits.swap(0, Ordering::Relaxed);
        let total = successes + failures;

        let snapshot = GatewaySnapshot {
            provider_health,
            hourly_cost: self.cost.summary().hourly.total_cost,
            success_rate: if total > 0 {
                successes as f64 / total as f64
            } else {
                1.0
            },
            error_rate: if total > 0 {
                failures as f64 / total as f64
            } else {
                0.0
            },
            avg_latency_ms: if successes > 0 {
                latency_total / successes
            } else {
                0
            },
            rate_limit_hits,
            total_calls: total,
        };
        self.monitor.record_snapshot(&snapshot)
    }

    // ── Introspection ──

    /// Cumulative per-provider usage (successful calls only).
    pub fn provider_stats(&self) -> HashMap<String, ProviderUsage> {
        self.usage.lock().expect("usage lock poisoned").clone()
    }

    /// Window totals and ceiling utilization.
    pub fn cost_summary(&self) -> CostSummary {
        self.cost.summary()
    }

    /// Breaker states plus recent alert counts by severity.
    pub fn health_status(&self) -> SystemHealthStatus {
        let providers = self
            .health
            .states()
            .into_iter()
            .map(|(name, state)| {
                (
                    name,
                    ProviderHealth {
                        circuit_open: state.open,
                        consecutive_failures: state.consecutive_failures,
                    },
                )
            })
            .collect();
        SystemHealthStatus {
            providers,
            alert_counts: self.monitor.severity_counts(),
        }
    }
}
