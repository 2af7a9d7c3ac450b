//! Configuration schema for the gateway.
//!
//! Hierarchy: `GatewayConfig` → `CostConfig`, `BreakerConfig`, `AlertConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! Every field has a default so a partial (or absent) file still loads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// Root config
// ─────────────────────────────────────────────

/// Root gateway configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    /// The provider tried first for every request.
    pub primary_provider: String,
    /// Ordered failover candidates after the primary. Empty means failover
    /// is disabled: the gateway fails fast on the primary alone.
    pub fallback_providers: Vec<String>,
    /// Rounds over the candidate list before giving up.
    pub max_retries: u32,
    /// Base delay for exponential backoff between failed rounds.
    pub base_retry_delay_ms: u64,
    /// Timeout for a single provider generate call.
    pub request_timeout_secs: u64,
    /// Timeout for a single provider health check.
    pub health_check_timeout_secs: u64,
    /// How long a cached health-check result stays valid.
    pub health_cache_ttl_secs: u64,
    /// Spend ceilings and persistence.
    pub cost: CostConfig,
    /// Health circuit breaker tuning.
    pub breaker: BreakerConfig,
    /// Alerting thresholds.
    pub alerts: AlertConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            primary_provider: "openai".to_string(),
            fallback_providers: Vec::new(),
            max_retries: 2,
            base_retry_delay_ms: 500,
            request_timeout_secs: 120,
            health_check_timeout_secs: 5,
            health_cache_ttl_secs: 300,
            cost: CostConfig::default(),
            breaker: BreakerConfig::default(),
            alerts: AlertConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Primary followed by fallbacks, deduplicated, order preserved.
    pub fn candidate_order(&self) -> Vec<String> {
        let mut order = vec![self.primary_provider.clone()];
        for name in &self.fallback_providers {
            if !order.contains(name) {
                order.push(name.clone());
            }
        }
        order
    }
}

// ─────────────────────────────────────────────
// Cost ceilings
// ─────────────────────────────────────────────

/// Spend ceilings, checked tightest-scope first: per-request, then the
/// hourly/daily/monthly rolling windows.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CostConfig {
    /// Ceiling for a single request, in USD.
    pub max_cost_per_request: f64,
    /// Rolling hourly ceiling, in USD.
    pub max_hourly_cost: f64,
    /// Rolling daily ceiling, in USD.
    pub max_daily_cost: f64,
    /// Rolling monthly ceiling, in USD.
    pub max_monthly_cost: f64,
    /// Per-provider overrides of the per-request ceiling.
    pub per_provider_request_limits: HashMap<String, f64>,
    /// Fraction of the hourly/monthly ceiling at which a non-blocking
    /// warning is emitted.
    pub warning_threshold: f64,
    /// Where cost windows are persisted. Empty means in-memory only.
    pub state_path: String,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            max_cost_per_request: 1.0,
            max_hourly_cost: 10.0,
            max_daily_cost: 100.0,
            max_monthly_cost: 1000.0,
            per_provider_request_limits: HashMap::new(),
            warning_threshold: 0.8,
            state_path: String::new(),
        }
    }
}

impl CostConfig {
    /// The per-request ceiling for a provider, honoring overrides.
    pub fn request_limit_for(&self, provider: &str) -> f64 {
        self.per_provider_request_limits
            .get(provider)
            .copied()
            .unwrap_or(self.max_cost_per_request)
    }
}

// ─────────────────────────────────────────────
// Health breaker
// ─────────────────────────────────────────────

/// Health circuit breaker tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before a half-open probe is allowed.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

// ─────────────────────────────────────────────
// Alerting
// ─────────────────────────────────────────────

/// Thresholds the production monitor evaluates on every snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertConfig {
    /// Maximum acceptable average latency, in milliseconds.
    pub max_latency_ms: u64,
    /// Minimum acceptable success rate (0.0 – 1.0).
    pub min_success_rate: f64,
    /// Maximum acceptable error rate (0.0 – 1.0).
    pub max_error_rate: f64,
    /// Hourly spend that triggers a cost alert, in USD.
    pub max_hourly_cost: f64,
    /// Rate-limit hits per snapshot that trigger an alert.
    pub max_rate_limit_hits: u32,
    /// Seconds during which an identical (source, title) alert is suppressed.
    pub cooldown_secs: u64,
    /// How many recent alerts to keep for summaries.
    pub history_limit: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_latency_ms: 30_000,
            min_success_rate: 0.90,
            max_error_rate: 0.10,
            max_hourly_cost: 10.0,
            max_rate_limit_hits: 5,
            cooldown_secs: 300,
            history_limit: 100,
        }
    }
}
