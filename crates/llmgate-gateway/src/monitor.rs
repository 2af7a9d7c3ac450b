//! Production monitor — converts periodic snapshots into alerts.
//!
//! Each snapshot is checked against the configured thresholds; severity
//! scales with how far past the threshold a value is. Identical
//! (source, title) alerts are suppressed within a cooldown to prevent
//! storms. Dispatch failures from a channel are caught and logged, never
//! propagated. A bounded history backs on-demand severity summaries.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use llmgate_core::config::AlertConfig;

// ─────────────────────────────────────────────
// Alert
// ─────────────────────────────────────────────

/// How bad it is.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// One alert event.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Unique id (source + millisecond timestamp).
    pub id: String,
    /// Short title; part of the dedup key.
    pub title: String,
    /// Human-readable detail.
    pub message: String,
    pub severity: AlertSeverity,
    pub timestamp: DateTime<Utc>,
    /// Which component or provider raised it; part of the dedup key.
    pub source: String,
    /// Structured context.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Alert {
    fn new(
        source: &str,
        title: &str,
        message: String,
        severity: AlertSeverity,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        let timestamp = Utc::now();
        Self {
            id: format!("{}-{}", source, timestamp.timestamp_millis()),
            title: title.to_string(),
            message,
            severity,
            timestamp,
            source: source.to_string(),
            metadata,
        }
    }
}

// ─────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────

/// Somewhere to send alerts. A failing channel is logged, never fatal.
pub trait AlertChannel: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Deliver one alert.
    fn dispatch(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Built-in channel that writes alerts to the tracing log.
pub struct LogChannel;

impl AlertChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn dispatch(&self, alert: &Alert) -> anyhow::Result<()> {
        match alert.severity {
            AlertSeverity::Critical => {
                error!(source = %alert.source, title = %alert.title, "{}", alert.message);
            }
            AlertSeverity::Warning => {
                warn!(source = %alert.source, title = %alert.title, "{}", alert.message);
            }
            AlertSeverity::Info => {
                info!(source = %alert.source, title = %alert.title, "{}", alert.message);
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────

/// Periodic observation of the gateway, fed to [`Monitor::record_snapshot`].
#[derive(Clone, Debug, Default)]
pub struct GatewaySnapshot {
    /// Per-provider health from the latest sweep.
    pub provider_health: HashMap<String, bool>,
    /// Spend in the current hourly window, USD.
    pub hourly_cost: f64,
    /// Fraction of calls that succeeded since the last snapshot (0 – 1).
    pub success_rate: f64,
    /// Fraction of calls that failed since the last snapshot (0 – 1).
    pub error_rate: f64,
    /// Mean call latency since the last snapshot, milliseconds.
    pub avg_latency_ms: u64,
    /// Rate-limit rejections since the last snapshot.
    pub rate_limit_hits: u32,
    /// Calls observed since the last snapshot.
    pub total_calls: u64,
}

/// Severity for a value that exceeded a "maximum" threshold:
/// twice the threshold or worse is critical.
fn overshoot_severity(value: f64, threshold: f64) -> AlertSeverity {
    if threshold > 0.0 && value >= threshold * 2.0 {
        AlertSeverity::Critical
    } else {
        AlertSeverity::Warning
    }
}

// ─────────────────────────────────────────────
// Monitor
// ─────────────────────────────────────────────

struct MonitorInner {
    history: VecDeque<Alert>,
    last_dispatched: HashMap<(String, String), DateTime<Utc>>,
}

/// Threshold + cooldown alerting over gateway snapshots.
pub struct Monitor {
    config: AlertConfig,
    channels: Vec<Arc<dyn AlertChannel>>,
    inner: Mutex<MonitorInner>,
}

impl Monitor {
    /// Create a monitor dispatching to the given channels.
    ///
    /// An empty channel list gets the built-in log channel.
    pub fn new(config: AlertConfig, channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        let channels = if channels.is_empty() {
            vec![Arc::new(LogChannel) as Arc<dyn AlertChannel>]
        } else {
            channels
        };
        Self {
            config,
            channels,
            inner: Mutex::new(MonitorInner {
                history: VecDeque::new(),
                last_dispatched: HashMap::new(),
            }),
        }
    }

    /// Evaluate one snapshot against the thresholds, dispatching any alerts
    /// that survive deduplication. Returns the dispatched alerts.
    pub fn record_snapshot(&self, snapshot: &GatewaySnapshot) -> Vec<Alert> {
        let mut raised = Vec::new();

        for (provider, healthy) in &snapshot.provider_health {
            if !healthy {
                raised.push(Alert::new(
                    provider,
                    "provider unhealthy",
                    format!("provider '{provider}' failed its health check"),
                    AlertSeverity::Warning,
                    HashMap::new(),
                ));
            }
        }

        if snapshot.avg_latency_ms > self.config.max_latency_ms {
            raised.push(Alert::new(
                "gateway",
                "latency above threshold",
                format!(
                    "average latency {}ms exceeds {}ms",
                    snapshot.avg_latency_ms, self.config.max_latency_ms
                ),
                overshoot_severity(snapshot.avg_latency_ms as f64, self.config.max_latency_ms as f64),
                HashMap::from([(
                    "avg_latency_ms".to_string(),
                    serde_json::json!(snapshot.avg_latency_ms),
                )]),
            ));
        }

        // Success/error rates are only meaningful when there was traffic.
        if snapshot.total_calls > 0 {
            if snapshot.success_rate < self.config.min_success_rate {
                let severity = if snapshot.success_rate <= self.config.min_success_rate / 2.0 {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::Warning
                };
                raised.push(Alert::new(
                    "gateway",
                    "success rate below threshold",
                    format!(
                        "success rate {:.1}% below minimum {:.1}%",
                        snapshot.success_rate * 100.0,
                        self.config.min_success_rate * 100.0
                    ),
                    severity,
                    HashMap::new(),
                ));
            }
            if snapshot.error_rate > self.config.max_error_rate {
                raised.push(Alert::new(
                    "gateway",
                    "error rate above threshold",
                    format!(
                        "error rate {:.1}% exceeds maximum {:.1}%",
                        snapshot.error_rate * 100.0,
                        self.config.max_error_rate * 100.0
                    ),
                    overshoot_severity(snapshot.error_rate, self.config.max_error_rate),
                    HashMap::new(),
                ));
            }
        }

        if snapshot.hourly_cost > self.config.max_hourly_cost {
            raised.push(Alert::new(
                "cost",
                "hourly cost above threshold",
                format!(
                    "hourly spend ${:.2} exceeds ${:.2}",
                    snapshot.hourly_cost, self.config.max_hourly_cost
                ),
                overshoot_severity(snapshot.hourly_cost, self.config.max_hourly_cost),
                HashMap::new(),
            ));
        }

        if snapshot.rate_limit_hits > self.config.max_rate_limit_hits {
            raised.push(Alert::new(
                "gateway",
                "rate limit hits above threshold",
                format!(
                    "{} rate-limit rejections exceed maximum {}",
                    snapshot.rate_limit_hits, self.config.max_rate_limit_hits
                ),
                overshoot_severity(
                    f64::from(snapshot.rate_limit_hits),
                    f64::from(self.config.max_rate_limit_hits),
                ),
                HashMap::new(),
            ));
        }

        raised
            .into_iter()
            .filter_map(|alert| self.dispatch(alert))
            .collect()
    }

    /// Dedup-check, deliver to every channel, and record in history.
    fn dispatch(&self, alert: Alert) -> Option<Alert> {
        {
            let mut inner = self.inner.lock().expect("monitor lock poisoned");
            let key = (alert.source.clone(), alert.title.clone());
            let cooldown = ChronoDuration::seconds(self.config.cooldown_secs as i64);
            if let Some(last) = inner.last_dispatched.get(&key) {
                if alert.timestamp - *last < cooldown {
                    debug!(source = %alert.source, title = %alert.title, "Alert suppressed by cooldown");
                    return None;
                }
            }
            inner.last_dispatched.insert(key, alert.timestamp);
            inner.history.push_back(alert.clone());
            while inner.history.len() > self.config.history_limit {
                inner.history.pop_front();
            }
        }

        for channel in &self.channels {
            if let Err(e) = channel.dispatch(&alert) {
                error!(channel = channel.name(), error = %e, "Alert channel dispatch failed");
            }
        }
        Some(alert)
    }

    /// Recent alerts, oldest first.
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.inner
            .lock()
            .expect("monitor lock poisoned")
            .history
            .iter()
            .cloned()
            .collect()
    }

    /// Count of recent alerts by severity.
    pub fn severity_counts(&self) -> HashMap<AlertSeverity, usize> {
        let inner = self.inner.lock().expect("monitor lock poisoned");
        let mut counts = HashMap::new();
        for alert in &inner.history {
            *counts.entry(alert.severity).or_insert(0) += 1;
        }
        counts
    }
}
