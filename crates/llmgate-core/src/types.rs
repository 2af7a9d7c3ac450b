//! Core request/response types exchanged between the gateway and its providers.
//!
//! A [`GenerationRequest`] is immutable once built: the orchestrator derives a
//! per-attempt [`AdaptedRequest`] from it (model resolved, parameters renamed,
//! clamped, and capped for the chosen backend) and never mutates the original.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ─────────────────────────────────────────────
// GenerationRequest
// ─────────────────────────────────────────────

/// A provider-agnostic text-generation request.
///
/// Built once by the caller, cloned and adapted per attempt by the gateway.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    /// System prompt (instructions, persona).
    pub system_prompt: String,
    /// User prompt (the actual task).
    pub user_prompt: String,
    /// Maximum tokens to generate. `None` lets the model default apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature. `None` lets the model default apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Explicit model override. `None` lets the gateway pick per provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Request strict-JSON output.
    pub json_mode: bool,
    /// Request a streaming response.
    pub streaming: bool,
    /// Reference to a structured-output schema, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_ref: Option<String>,
    /// Attachment references (image URLs, file ids). Presence implies the
    /// chosen model must support vision input.
    pub attachments: Vec<String>,
    /// Free-form metadata propagated into the response.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            user_prompt: String::new(),
            max_tokens: None,
            temperature: None,
            model: None,
            json_mode: false,
            streaming: false,
            schema_ref: None,
            attachments: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

impl GenerationRequest {
    /// Create a request from a system and user prompt.
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            ..Self::default()
        }
    }

    /// Set the max-tokens cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Force a specific model id.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Request strict-JSON output.
    pub fn with_json_mode(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Rough context-size estimate in tokens: prompt chars / 4 plus the
    /// requested (or a default) output allowance.
    pub fn estimated_tokens(&self) -> u32 {
        let prompt_chars = self.system_prompt.chars().count() + self.user_prompt.chars().count();
        let prompt_tokens = (prompt_chars / 4) as u32;
        prompt_tokens + self.max_tokens.unwrap_or(1024)
    }

    /// Flatten the tunable parameters into a wire-parameter map.
    ///
    /// This is the input to parameter adaptation: renames, drops, and clamps
    /// all operate on this map rather than on the typed request.
    pub fn wire_params(&self) -> HashMap<String, serde_json::Value> {
        let mut params = HashMap::new();
        if let Some(max_tokens) = self.max_tokens {
            params.insert("max_tokens".to_string(), serde_json::json!(max_tokens));
        }
        if let Some(temperature) = self.temperature {
            params.insert("temperature".to_string(), serde_json::json!(temperature));
        }
        if self.json_mode {
            params.insert(
                "response_format".to_string(),
                serde_json::json!({"type": "json_object"}),
            );
        }
        if self.streaming {
            params.insert("stream".to_string(), serde_json::json!(true));
        }
        params
    }
}

// ─────────────────────────────────────────────
// AdaptedRequest
// ─────────────────────────────────────────────

/// A per-attempt copy of a request, resolved for one concrete backend model.
///
/// `params` has already been through parameter adaptation (renamed keys,
/// clamped temperature, capped output tokens).
#[derive(Clone, Debug)]
pub struct AdaptedRequest {
    /// System prompt, unchanged from the original request.
    pub system_prompt: String,
    /// User prompt, unchanged from the original request.
    pub user_prompt: String,
    /// The concrete model id this attempt targets.
    pub model: String,
    /// Adapted wire parameters.
    pub params: HashMap<String, serde_json::Value>,
    /// Metadata carried through from the original request.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AdaptedRequest {
    /// Read the adapted max-tokens value, under either common key name.
    pub fn max_tokens(&self) -> Option<u64> {
        self.params
            .get("max_tokens")
            .or_else(|| self.params.get("max_completion_tokens"))
            .and_then(|v| v.as_u64())
    }

    /// Read the adapted temperature, if still present.
    pub fn temperature(&self) -> Option<f64> {
        self.params.get("temperature").and_then(|v| v.as_f64())
    }
}

// ─────────────────────────────────────────────
// Completion / GenerationResponse
// ─────────────────────────────────────────────

/// Raw output of a single provider call: content plus token usage.
///
/// The orchestrator turns this into a [`GenerationResponse`] by attaching
/// cost, latency, and provenance.
#[derive(Clone, Debug)]
pub struct Completion {
    /// Generated text. Guaranteed non-empty by the provider boundary.
    pub content: String,
    /// Total tokens consumed (prompt + completion).
    pub tokens_used: u32,
    /// The model that actually served the request.
    pub model: String,
}

/// The gateway's answer to a [`GenerationRequest`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    /// Generated text. Never empty.
    pub content: String,
    /// Name of the provider that served the request.
    pub provider: String,
    /// Model id that served the request.
    pub model: String,
    /// Total tokens consumed.
    pub tokens_used: u32,
    /// Actual cost of the call in USD.
    pub cost: f64,
    /// Wall-clock latency in milliseconds.
    pub latency_ms: u64,
    /// When the response was produced.
    pub timestamp: DateTime<Utc>,
    /// Metadata carried through from the request.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

// ─────────────────────────────────────────────
// ProviderUsage
// ─────────────────────────────────────────────

/// Cumulative per-provider usage counters. Mutated on successful calls only.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    /// Total tokens consumed across all successful calls.
    pub tokens: u64,
    /// Total spend in USD across all successful calls.
    pub cost: f64,
    /// Number of successful calls.
    pub requests: u64,
}

impl ProviderUsage {
    /// Fold one successful call into the counters.
    pub fn record(&mut self, tokens: u32, cost: f64) {
        self.tokens += u64::from(tokens);
        self.cost += cost;
        self.requests += 1;
    }
}
