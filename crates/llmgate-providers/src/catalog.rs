//! Model capability catalog — per-model limits, capabilities, and costs.
//!
//! The catalog answers three questions for the orchestrator:
//! which models can serve a request (capability/context queries), what they
//! cost (selection is cheapest-first), and how to shape request parameters
//! for a given backend (`adapt_parameters`).
//!
//! Unknown models always degrade to passthrough — a lookup miss is never an
//! error anywhere in this module.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────
// Capability
// ─────────────────────────────────────────────

/// A named feature a model may or may not support.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Accepts a sampling temperature.
    Temperature,
    /// Supports strict-JSON output mode.
    JsonMode,
    /// Supports streamed responses.
    Streaming,
    /// Supports schema-constrained structured output.
    StructuredOutput,
    /// Accepts image input.
    Vision,
    /// Reasoning model (extended internal chain-of-thought).
    Reasoning,
}

// ─────────────────────────────────────────────
// ModelDescriptor
// ─────────────────────────────────────────────

/// Static description of one model: limits, capabilities, parameter quirks,
/// and cost rates. Immutable once registered; keyed by (provider, model id).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Provider that serves this model (e.g. `"openai"`).
    pub provider: String,
    /// Model id as sent on the wire (e.g. `"gpt-4o-mini"`).
    pub id: String,
    /// Human-readable name for logs.
    pub display_name: String,
    /// Total context window, in tokens.
    pub context_window: u32,
    /// Hard cap on generated tokens.
    pub max_output_tokens: u32,
    /// Features this model supports.
    pub capabilities: HashSet<Capability>,
    /// Wire-parameter renames, applied during adaptation.
    /// E.g. `"max_tokens"` → `"max_completion_tokens"` for reasoning models.
    pub param_renames: HashMap<String, String>,
    /// Lowest accepted temperature.
    pub temperature_min: f64,
    /// Highest accepted temperature.
    pub temperature_max: f64,
    /// Temperature substituted when the requested one is out of range.
    pub temperature_default: f64,
    /// Input cost per 1K tokens, USD.
    pub input_cost_per_1k: f64,
    /// Output cost per 1K tokens, USD.
    pub output_cost_per_1k: f64,
}

impl ModelDescriptor {
    /// Blended per-1K-token rate: mean of input and output cost.
    pub fn blended_rate(&self) -> f64 {
        (self.input_cost_per_1k + self.output_cost_per_1k) / 2.0
    }

    /// Estimated cost in USD for roughly `tokens` total tokens.
    pub fn estimate_cost(&self, tokens: u32) -> f64 {
        f64::from(tokens) / 1000.0 * self.blended_rate()
    }

    /// A generic descriptor for a model we know nothing about.
    pub fn generic(provider: &str, id: &str) -> Self {
        Self {
            provider: provider.to_string(),
            id: id.to_string(),
            display_name: id.to_string(),
            context_window: 128_000,
            max_output_tokens: 4_096,
            capabilities: [Capability::Temperature, Capability::JsonMode, Capability::Streaming]
                .into_iter()
                .collect(),
            param_renames: HashMap::new(),
            temperature_min: 0.0,
            temperature_max: 2.0,
            temperature_default: 0.7,
            input_cost_per_1k: 0.001,
            output_cost_per_1k: 0.002,
        }
    }

    /// A conservative descriptor for a reasoning-style model id: no
    /// temperature control, `max_tokens` renamed to `max_completion_tokens`.
    pub fn reasoning_default(provider: &str, id: &str) -> Self {
        Self {
            capabilities: [Capability::JsonMode, Capability::Streaming, Capability::Reasoning]
                .into_iter()
                .collect(),
            param_renames: [("max_tokens".to_string(), "max_completion_tokens".to_string())]
                .into_iter()
                .collect(),
            max_output_tokens: 32_768,
            ..Self::generic(provider, id)
        }
    }
}

/// Model-id prefixes that indicate a reasoning-style model.
const REASONING_PREFIXES: &[&str] = &["o1", "o3", "o4", "gpt-5"];

fn looks_like_reasoning_model(id: &str) -> bool {
    let id_lower = id.to_lowercase();
    REASONING_PREFIXES.iter().any(|p| id_lower.starts_with(p))
}

// ─────────────────────────────────────────────
// ModelCatalog
// ─────────────────────────────────────────────

/// Read-mostly registry of [`ModelDescriptor`]s.
///
/// Thread-safe via `RwLock` — queries vastly outnumber registrations.
pub struct ModelCatalog {
    models: RwLock<HashMap<(String, String), ModelDescriptor>>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// A catalog seeded with the built-in descriptors for the common
    /// OpenAI / Anthropic / Gemini models.
    pub fn with_defaults() -> Self {
        let catalog = Self::new();
        for descriptor in builtin_models() {
            catalog.register(descriptor);
        }
        catalog
    }

    /// Register (or replace) a descriptor under its (provider, id) key.
    pub fn register(&self, descriptor: ModelDescriptor) {
        let key = (descriptor.provider.clone(), descriptor.id.clone());
        let mut models = self.models.write().expect("catalog lock poisoned");
        if models.insert(key, descriptor).is_some() {
            debug!("Replaced existing model descriptor");
        }
    }

    /// Auto-register an unrecognized model id with a heuristic default.
    ///
    /// Ids with a reasoning-style prefix (`o1`, `o3`, `o4`, `gpt-5`) get
    /// no-temperature defaults and the `max_completion_tokens` rename;
    /// everything else gets a generic descriptor. No-op if already known.
    pub fn ensure_registered(&self, provider: &str, id: &str) {
        if self.get(provider, id).is_some() {
            return;
        }
        let descriptor = if looks_like_reasoning_model(id) {
            ModelDescriptor::reasoning_default(provider, id)
        } else {
            ModelDescriptor::generic(provider, id)
        };
        info!(provider, model = id, "Auto-registering unknown model with default descriptor");
        self.register(descriptor);
    }

    /// Exact lookup by (provider, model id).
    pub fn get(&self, provider: &str, id: &str) -> Option<ModelDescriptor> {
        self.models
            .read()
            .expect("catalog lock poisoned")
            .get(&(provider.to_string(), id.to_string()))
            .cloned()
    }

    /// All descriptors for one provider.
    pub fn models_for_provider(&self, provider: &str) -> Vec<ModelDescriptor> {
        self.models
            .read()
            .expect("catalog lock poisoned")
            .values()
            .filter(|d| d.provider == provider)
            .cloned()
            .collect()
    }

    /// Cheapest model whose capability set covers `required`.
    pub fn find_with_capabilities(&self, required: &HashSet<Capability>) -> Option<ModelDescriptor> {
        self.models
            .read()
            .expect("catalog lock poisoned")
            .values()
            .filter(|d| required.is_subset(&d.capabilities))
            .min_by(|a, b| a.blended_rate().total_cmp(&b.blended_rate()))
            .cloned()
    }

    /// Cheapest model whose context window fits `tokens`.
    pub fn find_for_context(&self, tokens: u32) -> Option<ModelDescriptor> {
        self.models
            .read()
            .expect("catalog lock poisoned")
            .values()
            .filter(|d| d.context_window >= tokens)
            .min_by(|a, b| a.blended_rate().total_cmp(&b.blended_rate()))
            .cloned()
    }

    /// Cheapest model of one provider satisfying both a capability set and a
    /// context requirement. Used for candidate ordering in the orchestrator.
    pub fn cheapest_for(
        &self,
        provider: &str,
        required: &HashSet<Capability>,
        context_tokens: u32,
    ) -> Option<ModelDescriptor> {
        self.models
            .read()
            .expect("catalog lock poisoned")
            .values()
            .filter(|d| {
                d.provider == provider
                    && required.is_subset(&d.capabilities)
                    && d.context_window >= context_tokens
            })
            .min_by(|a, b| a.blended_rate().total_cmp(&b.blended_rate()))
            .cloned()
    }

    /// Shape wire parameters for one backend model. Pure and total:
    ///
    /// 1. rename keys per the descriptor's rename table
    /// 2. drop `temperature` for models without the capability
    /// 3. substitute the model default for an out-of-range temperature
    /// 4. cap the output-token request at the model max
    ///
    /// Unknown models pass through unchanged. Idempotent: adapting an
    /// already-adapted map is a no-op.
    pub fn adapt_parameters(
        &self,
        provider: &str,
        model: &str,
        params: &HashMap<String, serde_json::Value>,
    ) -> HashMap<String, serde_json::Value> {
        let Some(descriptor) = self.get(provider, model) else {
            return params.clone();
        };

        let mut adapted = params.clone();

        // 1. Renames. A key already under its target name is left alone.
        for (from, to) in &descriptor.param_renames {
            if let Some(value) = adapted.remove(from) {
                adapted.entry(to.clone()).or_insert(value);
            }
        }

        // 2–3. Temperature: drop or bring into range.
        if !descriptor.capabilities.contains(&Capability::Temperature) {
            if adapted.remove("temperature").is_some() {
                debug!(provider, model, "Dropped temperature for model without temperature control");
            }
        } else if let Some(temp) = adapted.get("temperature").and_then(|v| v.as_f64()) {
            if temp < descriptor.temperature_min || temp > descriptor.temperature_max {
                warn!(
                    provider,
                    model,
                    requested = temp,
                    substituted = descriptor.temperature_default,
                    "Temperature out of range, substituting model default"
                );
                adapted.insert(
                    "temperature".to_string(),
                    serde_json::json!(descriptor.temperature_default),
                );
            }
        }

        // 4. Output-token cap, under whichever key survived the rename.
        for key in ["max_tokens", "max_completion_tokens"] {
            if let Some(requested) = adapted.get(key).and_then(|v| v.as_u64()) {
                let cap = u64::from(descriptor.max_output_tokens);
                if requested > cap {
                    warn!(
                        provider,
                        model, requested, cap, "Capping output tokens at model maximum"
                    );
                    adapted.insert(key.to_string(), serde_json::json!(cap));
                }
            }
        }

        adapted
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.models.read().expect("catalog lock poisoned").len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─────────────────────────────────────────────
// Built-in catalogue
// ─────────────────────────────────────────────

fn full_caps() -> HashSet<Capability> {
    [
        Capability::Temperature,
        Capability::JsonMode,
        Capability::Streaming,
        Capability::StructuredOutput,
        Capability::Vision,
    ]
    .into_iter()
    .collect()
}

/// Seed descriptors for the common hosted models.
fn builtin_models() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor {
            display_name: "GPT-4o".to_string(),
            context_window: 128_000,
            max_output_tokens: 16_384,
            capabilities: full_caps(),
            input_cost_per_1k: 0.0025,
            output_cost_per_1k: 0.01,
            ..ModelDescriptor::generic("openai", "gpt-4o")
        },
        ModelDescriptor {
            display_name: "GPT-4o mini".to_string(),
            context_window: 128_000,
            max_output_tokens: 16_384,
            capabilities: full_caps(),
            input_cost_per_1k: 0.00015,
            output_cost_per_1k: 0.0006,
            ..ModelDescriptor::generic("openai", "gpt-4o-mini")
        },
        ModelDescriptor {
            display_name: "o1-mini".to_string(),
            context_window: 128_000,
            input_cost_per_1k: 0.0011,
            output_cost_per_1k: 0.0044,
            ..ModelDescriptor::reasoning_default("openai", "o1-mini")
        },
        ModelDescriptor {
            display_name: "Claude Sonnet 4".to_string(),
            context_window: 200_000,
            max_output_tokens: 64_000,
            capabilities: full_caps(),
            temperature_max: 1.0,
            temperature_default: 1.0,
            input_cost_per_1k: 0.003,
            output_cost_per_1k: 0.015,
            ..ModelDescriptor::generic("anthropic", "claude-sonnet-4-20250514")
        },
        ModelDescriptor {
            display_name: "Claude 3.5 Haiku".to_string(),
            context_window: 200_000,
            max_output_tokens: 8_192,
            capabilities: full_caps(),
            temperature_max: 1.0,
            temperature_default: 1.0,
            input_cost_per_1k: 0.0008,
            output_cost_per_1k: 0.004,
            ..ModelDescriptor::generic("anthropic", "claude-3-5-haiku-20241022")
        },
        ModelDescriptor {
            display_name: "Gemini 2.0 Flash".to_string(),
            context_window: 1_000_000,
            max_output_tokens: 8_192,
            capabilities: full_caps(),
            input_cost_per_1k: 0.0001,
            output_cost_per_1k: 0.0004,
            ..ModelDescriptor::generic("gemini", "gemini-2.0-flash")
        },
    ]
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
