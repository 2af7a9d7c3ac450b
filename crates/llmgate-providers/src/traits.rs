//! The provider contract — every LLM backend implements this trait.
//!
//! Implementations classify every failure into the three-kind
//! [`ProviderError`] taxonomy; an error the backend can't classify maps
//! conservatively to `TransientUnavailable`. Only successful calls may touch
//! a provider's own usage counters.

use async_trait::async_trait;
use llmgate_core::{AdaptedRequest, Completion, ProviderError};

/// A pluggable LLM backend.
///
/// `health_check` itself is unbounded; callers wrap it in a timeout and
/// treat expiry as unhealthy.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique registry name (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Generate a completion for an already-adapted request.
    ///
    /// The returned completion is guaranteed non-empty; an empty body from
    /// the wire must surface as `TransientUnavailable`.
    async fn generate(&self, request: &AdaptedRequest) -> Result<Completion, ProviderError>;

    /// Model ids this backend serves.
    fn list_models(&self) -> Vec<String>;

    /// Estimated cost in USD for a call of roughly `tokens` total tokens.
    fn estimate_cost(&self, tokens: u32, model: &str) -> f64;

    /// Whether the backend currently looks reachable.
    async fn health_check(&self) -> bool;
}
