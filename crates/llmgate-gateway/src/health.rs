//! Health circuit breaker — per-provider consecutive-failure tracking.
//!
//! State machine per provider: CLOSED → OPEN once `failure_threshold`
//! consecutive failures accumulate → after `cooldown` a half-open probe is
//! allowed → CLOSED on success, OPEN again on failure. Any success resets
//! the counter unconditionally.
//!
//! `can_attempt` is a non-blocking check against in-memory state plus the
//! clock; it must be consulted before every network attempt.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Snapshot of one provider's breaker state.
#[derive(Clone, Debug, Default)]
pub struct BreakerState {
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When the most recent failure happened.
    pub last_failure: Option<Instant>,
    /// Whether the circuit is currently open.
    pub open: bool,
}

/// Per-provider health circuit breaker.
pub struct HealthBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    states: Mutex<HashMap<String, BreakerState>>,
}

impl HealthBreaker {
    /// Create a breaker that opens after `failure_threshold` consecutive
    /// failures and allows a probe after `cooldown`.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failed attempt against a provider.
    pub fn record_failure(&self, provider: &str) {
        let mut states = self.states.lock().expect("breaker lock poisoned");
        let state = states.entry(provider.to_string()).or_default();
        state.consecutive_failures += 1;
        state.last_failure = Some(Instant::now());
        if !state.open && state.consecutive_failures >= self.failure_threshold {
            state.open = true;
            warn!(
                provider,
                failures = state.consecutive_failures,
                "Circuit opened after consecutive failures"
            );
        } else if state.open {
            // Failed half-open probe: the circuit stays open and the
            // cooldown restarts from this failure.
            debug!(provider, "Probe failed, circuit stays open");
        }
    }

    /// Record a successful attempt — always resets to CLOSED / zero.
    pub fn record_success(&self, provider: &str) {
        let mut states = self.states.lock().expect("breaker lock poisoned");
        let state = states.entry(provider.to_string()).or_default();
        if state.open {
            info!(provider, "Circuit closed after successful attempt");
        }
        *state = BreakerState::default();
    }

    /// Whether an attempt against this provider is currently allowed.
    ///
    /// Closed circuit: always. Open circuit: only once the cooldown since
    /// the last failure has elapsed (the half-open probe).
    pub fn can_attempt(&self, provider: &str) -> bool {
        let states = self.states.lock().expect("breaker lock poisoned");
        match states.get(provider) {
            None => true,
            Some(state) if !state.open => true,
            Some(state) => match state.last_failure {
                Some(at) => at.elapsed() >= self.cooldown,
                None => true,
            },
        }
    }

    /// Snapshot of one provider's state.
    pub fn state(&self, provider: &str) -> BreakerState {
        self.states
            .lock()
            .expect("breaker lock poisoned")
            .get(provider)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of every tracked provider's state.
    pub fn states(&self) -> HashMap<String, BreakerState> {
        self.states.lock().expect("breaker lock poisoned").clone()
    }
}
