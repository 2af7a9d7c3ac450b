//! Generic HTTP backend for OpenAI-compatible `/chat/completions` APIs.
//!
//! One `HttpProvider` instance covers any vendor exposing the OpenAI wire
//! shape (OpenAI itself, Anthropic/Gemini via compatible endpoints or
//! gateways, self-hosted vLLM). Every failure is classified into the
//! three-kind [`ProviderError`] taxonomy at this boundary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, warn};

use llmgate_core::{AdaptedRequest, Completion, ProviderError};

use crate::catalog::ModelCatalog;
use crate::traits::Provider;

/// Fallback blended rate (USD per 1K tokens) for models missing from the catalog.
const DEFAULT_RATE_PER_1K: f64 = 0.002;

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// An LLM backend reached over an OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// Registry name (e.g. `"openai"`).
    name: String,
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    /// API key for Bearer authentication.
    api_key: String,
    /// Models this instance serves, first entry is the default.
    models: Vec<String>,
    /// Catalog handle for cost rates.
    catalog: Arc<ModelCatalog>,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("name", &self.name)
            .field("api_base", &self.api_base)
            .field("models", &self.models)
            .finish()
    }
}

impl HttpProvider {
    /// Create a provider for one OpenAI-compatible endpoint.
    ///
    /// Every model id in `models` is auto-registered in the catalog if the
    /// catalog doesn't already describe it.
    pub fn new(
        name: impl Into<String>,
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        models: Vec<String>,
        catalog: Arc<ModelCatalog>,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        for model in &models {
            catalog.ensure_registered(&name, model);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::FatalRequest(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            name,
            client,
            api_base: api_base.into(),
            api_key: api_key.into(),
            models,
            catalog,
        })
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Build the models listing URL (used for health checks).
    fn models_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{base}/models")
    }

    /// Assemble the request body: model + messages + adapted wire params.
    fn request_body(&self, request: &AdaptedRequest) -> serde_json::Value {
        let mut messages = Vec::new();
        if !request.system_prompt.is_empty() {
            messages.push(serde_json::json!({"role": "system", "content": request.system_prompt}));
        }
        messages.push(serde_json::json!({"role": "user", "content": request.user_prompt}));

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(map) = body.as_object_mut() {
            for (key, value) in &request.params {
                map.insert(key.clone(), value.clone());
            }
        }
        body
    }

    fn classify_transport_error(&self, e: &reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::TransientUnavailable(format!("request timed out: {e}"))
        } else {
            ProviderError::TransientUnavailable(format!("transport error: {e}"))
        }
    }
}

#[async_trait]
impl Provider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &AdaptedRequest) -> Result<Completion, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            params = request.params.len(),
            "Calling LLM"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(|e| {
                error!(provider = %self.name, error = %e, "HTTP request failed");
                self.classify_transport_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            error!(provider = %self.name, status = %status, body = %body, "API error");
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let chat: ChatCompletionResponse = response.json().await.map_err(|e| {
            error!(provider = %self.name, error = %e, "Failed to parse LLM response");
            ProviderError::TransientUnavailable(format!("unparseable response: {e}"))
        })?;

        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        if content.is_empty() {
            warn!(provider = %self.name, "Backend returned empty content");
            return Err(ProviderError::TransientUnavailable(
                "backend returned empty content".to_string(),
            ));
        }

        Ok(Completion {
            content,
            tokens_used: chat.usage.map_or(0, |u| u.total_tokens),
            model: chat.model.unwrap_or_else(|| request.model.clone()),
        })
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn estimate_cost(&self, tokens: u32, model: &str) -> f64 {
        match self.catalog.get(&self.name, model) {
            Some(descriptor) => descriptor.estimate_cost(tokens),
            None => f64::from(tokens) / 1000.0 * DEFAULT_RATE_PER_1K,
        }
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(self.models_url())
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(provider = %self.name, error = %e, "Health check request failed");
                false
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapted(model: &str) -> AdaptedRequest {
        AdaptedRequest {
            system_prompt: "be helpful".to_string(),
            user_prompt: "hello".to_string(),
            model: model.to_string(),
            params: HashMap::from([("max_tokens".to_string(), serde_json::json!(64))]),
            metadata: HashMap::new(),
        }
    }

    fn make_provider(base: &str) -> HttpProvider {
        HttpProvider::new(
            "openai",
            base,
            "test-key",
            vec!["gpt-4o-mini".to_string()],
            Arc::new(ModelCatalog::with_defaults()),
        )
        .unwrap()
    }

    // ── Unit tests ──

    #[test]
    fn test_completions_url_trailing_slash() {
        let provider = make_provider("https://api.openai.com/v1/");
        assert_eq!(
            provider.completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body_merges_params() {
        let provider = make_provider("https://api.openai.com/v1");
        let body = provider.request_body(&adapted("gpt-4o-mini"));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_request_body_skips_empty_system_prompt() {
        let provider = make_provider("https://api.openai.com/v1");
        let mut req = adapted("gpt-4o-mini");
        req.system_prompt = String::new();
        let body = provider.request_body(&req);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_estimate_cost_uses_catalog_rate() {
        let provider = make_provider("https://api.openai.com/v1");
        // gpt-4o-mini blended rate = (0.00015 + 0.0006) / 2 per 1K
        let cost = provider.estimate_cost(1000, "gpt-4o-mini");
        assert!((cost - 0.000375).abs() < 1e-9);
        // Unknown model falls back to the flat default
        let cost = provider.estimate_cost(1000, "never-heard-of-it");
        assert!((cost - DEFAULT_RATE_PER_1K).abs() < 1e-9);
    }

    #[test]
    fn test_new_auto_registers_models() {
        let catalog = Arc::new(ModelCatalog::new());
        let _provider = HttpProvider::new(
            "acme",
            "https://acme.example/v1",
            "k",
            vec!["acme-large".to_string()],
            Arc::clone(&catalog),
        )
        .unwrap();
        assert!(catalog.get("acme", "acme-large").is_some());
    }

    // ── Wire tests ──

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hi there"}}],
                "usage": {"total_tokens": 42},
                "model": "gpt-4o-mini-2024"
            })))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let completion = provider.generate(&adapted("gpt-4o-mini")).await.unwrap();
        assert_eq!(completion.content, "hi there");
        assert_eq!(completion.tokens_used, 42);
        assert_eq!(completion.model, "gpt-4o-mini-2024");
    }

    #[tokio::test]
    async fn test_generate_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let err = provider.generate(&adapted("gpt-4o-mini")).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_generate_401_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let err = provider.generate(&adapted("gpt-4o-mini")).await.unwrap_err();
        assert!(matches!(err, ProviderError::FatalRequest(_)));
    }

    #[tokio::test]
    async fn test_generate_500_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let err = provider.generate(&adapted("gpt-4o-mini")).await.unwrap_err();
        assert!(matches!(err, ProviderError::TransientUnavailable(_)));
    }

    #[tokio::test]
    async fn test_generate_empty_content_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": ""}}],
                "usage": {"total_tokens": 5}
            })))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        let err = provider.generate(&adapted("gpt-4o-mini")).await.unwrap_err();
        assert!(matches!(err, ProviderError::TransientUnavailable(_)));
    }

    #[tokio::test]
    async fn test_health_check_hits_models_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let provider = make_provider(&server.uri());
        assert!(provider.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_unreachable_is_false() {
        // Port 9 is discard; nothing should be listening
        let provider = make_provider("http://127.0.0.1:9/v1");
        assert!(!provider.health_check().await);
    }
}
