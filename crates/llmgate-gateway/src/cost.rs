//! Cost circuit breaker — multi-window spend tracking with admission control.
//!
//! Ceiling hierarchy, checked tightest-scope first: per-request (optionally
//! overridden per provider), then the rolling hourly, daily, and monthly
//! windows. Window semantics are lazy: a window older than its duration
//! resets the next time it is touched, never on a timer.
//!
//! A separate last-resort kill switch, distinct from the health breaker,
//! opens after three consecutive recorded failures and refuses all
//! admissions until a success clears it.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use llmgate_core::config::CostConfig;

use crate::store::CostStore;

/// Consecutive failures that trip the kill switch.
const KILL_SWITCH_THRESHOLD: u32 = 3;

// ─────────────────────────────────────────────
// CostWindow
// ─────────────────────────────────────────────

/// Spend accounting for one rolling period.
///
/// Totals only ever decrease through [`CostWindow::touch`]'s lazy reset.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CostWindow {
    /// Total spend in this window, USD.
    pub total_cost: f64,
    /// Requests recorded in this window.
    pub request_count: u64,
    /// When this window started (RFC 3339 on disk).
    pub window_start: DateTime<Utc>,
}

impl Default for CostWindow {
    fn default() -> Self {
        Self {
            total_cost: 0.0,
            request_count: 0,
            window_start: Utc::now(),
        }
    }
}

impl CostWindow {
    /// Lazily reset the window if it is older than `duration` as of `now`.
    pub fn touch(&mut self, duration: ChronoDuration, now: DateTime<Utc>) {
        if now - self.window_start >= duration {
            debug!(
                expired_start = %self.window_start,
                total = self.total_cost,
                "Cost window expired, resetting"
            );
            self.total_cost = 0.0;
            self.request_count = 0;
            self.window_start = now;
        }
    }

    /// Add one request's cost to the window.
    pub fn add(&mut self, cost: f64) {
        self.total_cost += cost;
        self.request_count += 1;
    }
}

/// The three windows as persisted to the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCostState {
    pub hourly: CostWindow,
    pub daily: CostWindow,
    pub monthly: CostWindow,
}

/// Read-only view of one window plus its ceiling utilization.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub total_cost: f64,
    pub request_count: u64,
    pub ceiling: f64,
    /// Spend as a percentage of the ceiling (0 – 100+).
    pub percent_used: f64,
}

/// Read-only view of all three windows.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub hourly: WindowSummary,
    pub daily: WindowSummary,
    pub monthly: WindowSummary,
    pub kill_switch_open: bool,
}

// ─────────────────────────────────────────────
// CostBreaker
// ─────────────────────────────────────────────

struct BreakerInner {
    windows: PersistedCostState,
    consecutive_failures: u32,
    kill_switch_open: bool,
}

/// Spend admission control over the three rolling windows.
pub struct CostBreaker {
    config: CostConfig,
    store: Arc<dyn CostStore>,
    inner: Mutex<BreakerInner>,
}

impl CostBreaker {
    /// Create a breaker, loading any persisted windows from the store.
    ///
    /// Nothing usable in the store means empty windows, never a failure.
    pub fn new(config: CostConfig, store: Arc<dyn CostStore>) -> Self {
        let windows = store.load().unwrap_or_else(|| {
            debug!("No persisted cost state, starting with empty windows");
            PersistedCostState::default()
        });
        Self {
            config,
            store,
            inner: Mutex::new(BreakerInner {
                windows,
                consecutive_failures: 0,
                kill_switch_open: false,
            }),
        }
    }

    /// Decide whether a request with `estimated_cost` may proceed.
    ///
    /// Returns `(allowed, reason)`; the reason names the first violated
    /// limit. Crossing the warning fraction of the hourly or monthly
    /// ceiling logs a warning but never blocks.
    pub fn check_request_allowed(&self, estimated_cost: f64, provider: &str) -> (bool, String) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("cost lock poisoned");

        if inner.kill_switch_open {
            return (
                false,
                "cost kill switch open after repeated failures".to_string(),
            );
        }

        let request_limit = self.config.request_limit_for(provider);
        if estimated_cost > request_limit {
            return (
                false,
                format!(
                    "estimated cost ${estimated_cost:.4} exceeds limit ${request_limit:.4} per request"
                ),
            );
        }

        inner.windows.hourly.touch(ChronoDuration::hours(1), now);
        inner.windows.daily.touch(ChronoDuration::days(1), now);
        inner.windows.monthly.touch(ChronoDuration::days(30), now);

        let checks = [
            ("hourly", inner.windows.hourly.total_cost, self.config.max_hourly_cost),
            ("daily", inner.windows.daily.total_cost, self.config.max_daily_cost),
            ("monthly", inner.windows.monthly.total_cost, self.config.max_monthly_cost),
        ];
        for (window, current, ceiling) in checks {
            let projected = current + estimated_cost;
            if projected > ceiling {
                return (
                    false,
                    format!(
                        "projected {window} spend ${projected:.4} exceeds limit ${ceiling:.4}"
                    ),
                );
            }
        }

        // Non-blocking warnings when projected spend nears a ceiling.
        let hourly_projected = inner.windows.hourly.total_cost + estimated_cost;
        if hourly_projected > self.config.warning_threshold * self.config.max_hourly_cost {
            warn!(
                provider,
                projected = hourly_projected,
                ceiling = self.config.max_hourly_cost,
                "Hourly spend approaching ceiling"
            );
        }
        let monthly_projected = inner.windows.monthly.total_cost + estimated_cost;
        if monthly_projected > self.config.warning_threshold * self.config.max_monthly_cost {
            warn!(
                provider,
                projected = monthly_projected,
                ceiling = self.config.max_monthly_cost,
                "Monthly spend approaching ceiling"
            );
        }

        (true, "allowed".to_string())
    }

    /// Record the actual cost of a completed request in all windows and
    /// persist the update.
    pub fn record_request(&self, actual_cost: f64, provider: &str) {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("cost lock poisoned");

        inner.windows.hourly.touch(ChronoDuration::hours(1), now);
        inner.windows.daily.touch(ChronoDuration::days(1), now);
        inner.windows.monthly.touch(ChronoDuration::days(30), now);

        inner.windows.hourly.add(actual_cost);
        inner.windows.daily.add(actual_cost);
        inner.windows.monthly.add(actual_cost);

        debug!(
            provider,
            cost = actual_cost,
            hourly_total = inner.windows.hourly.total_cost,
            "Recorded request cost"
        );

        if let Err(e) = self.store.save(&inner.windows) {
            error!(error = %e, "Failed to persist cost windows");
        }
    }

    /// Record a failed generation round. Three consecutive failures open
    /// the kill switch.
    pub fn record_failure(&self, reason: &str) {
        let mut inner = self.inner.lock().expect("cost lock poisoned");
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= KILL_SWITCH_THRESHOLD && !inner.kill_switch_open {
            inner.kill_switch_open = true;
            error!(
                reason,
                failures = inner.consecutive_failures,
                "Cost kill switch opened after repeated failures"
            );
        }
    }

    /// Clear the failure counter and close the kill switch.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("cost lock poisoned");
        if inner.kill_switch_open {
            warn!("Cost kill switch closed after success");
        }
        inner.consecutive_failures = 0;
        inner.kill_switch_open = false;
    }

    /// Current window totals and ceiling utilization.
    pub fn summary(&self) -> CostSummary {
        let now = Utc::now();
        let mut inner = self.inner.lock().expect("cost lock poisoned");
        inner.windows.hourly.touch(ChronoDuration::hours(1), now);
        inner.windows.daily.touch(ChronoDuration::days(1), now);
        inner.windows.monthly.touch(ChronoDuration::days(30), now);

        let summarize = |window: &CostWindow, ceiling: f64| WindowSummary {
            total_cost: window.total_cost,
            request_count: window.request_count,
            ceiling,
            percent_used: if ceiling > 0.0 {
                window.total_cost / ceiling * 100.0
            } else {
                0.0
            },
        };

        CostSummary {
            hourly: summarize(&inner.windows.hourly, self.config.max_hourly_cost),
            daily: summarize(&inner.windows.daily, self.config.max_daily_cost),
            monthly: summarize(&inner.windows.monthly, self.config.max_monthly_cost),
            kill_switch_open: inner.kill_switch_open,
        }
    }

    #[cfg(test)]
    fn backdate_windows(&self, by: ChronoDuration) {
        let mut inner = self.inner.lock().expect("cost lock poisoned");
        inner.windows.hourly.window_start = inner.windows.hourly.window_start - by;
        inner.windows.daily.window_start = inner.windows.daily.window_start - by;
        inner.windows.monthly.window_start = inner.windows.monthly.window_start - by;
    }
}
