//! Error taxonomy for the gateway.
//!
//! Provider failures classify into exactly three kinds, which drive the
//! failover loop: retry elsewhere, fail over immediately, or give up.
//! Breaker refusals ([`GateError::BudgetExceeded`], [`GateError::CircuitOpen`])
//! never correspond to a network call. All of these are absorbed inside the
//! orchestrator; callers of `generate()` only ever see a [`TerminalError`].

use thiserror::Error;

/// A classified failure from one provider attempt.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ProviderError {
    /// The backend is temporarily unavailable (5xx, timeout, connect error,
    /// empty/unparseable body). Worth retrying on another provider.
    #[error("provider temporarily unavailable: {0}")]
    TransientUnavailable(String),

    /// The backend rejected the call for rate reasons (429). Fail over
    /// immediately; do not retry the same provider in this round.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The request itself is bad (4xx other than 429). Never retryable.
    #[error("fatal request error: {0}")]
    FatalRequest(String),
}

impl ProviderError {
    /// Classify an HTTP status + body into the three-kind taxonomy.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => Self::RateLimited(format!("HTTP 429: {body}")),
            400 | 401 | 403 | 404 | 422 => Self::FatalRequest(format!("HTTP {status}: {body}")),
            _ => Self::TransientUnavailable(format!("HTTP {status}: {body}")),
        }
    }

    /// Whether another provider may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::FatalRequest(_))
    }
}

/// Why the gateway skipped a candidate without calling it, or why a call failed.
///
/// Only the `Provider` variant involves a network attempt.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum GateError {
    /// The provider was called and failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The cost circuit breaker refused admission.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    /// The health circuit breaker is open for this provider.
    #[error("circuit open for provider '{0}'")]
    CircuitOpen(String),
}

/// The single failure `generate()` surfaces after exhausting every candidate
/// across every retry round.
#[derive(Clone, Debug, Error, PartialEq)]
#[error(
    "all providers exhausted after {attempts} attempt(s) across [{}]; last error: {last_error}",
    .providers_tried.join(", ")
)]
pub struct TerminalError {
    /// Every provider the loop attempted or considered, in order, deduplicated.
    pub providers_tried: Vec<String>,
    /// Total provider invocations made before giving up.
    pub attempts: u32,
    /// The last concrete error observed.
    pub last_error: String,
}
