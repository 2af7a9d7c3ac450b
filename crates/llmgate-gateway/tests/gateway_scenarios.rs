//! End-to-end failover scenarios against scripted in-memory providers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use llmgate_core::config::{CostConfig, GatewayConfig};
use llmgate_core::{AdaptedRequest, Completion, GenerationRequest, ProviderError};
use llmgate_providers::catalog::{ModelCatalog, ModelDescriptor};
use llmgate_providers::registry::ProviderRegistry;
use llmgate_providers::traits::Provider;
use llmgate_gateway::manager::GatewayManager;
use llmgate_gateway::store::MemoryCostStore;

// ─────────────────────────────────────────────
// Scripted provider
// ─────────────────────────────────────────────

#[derive(Clone)]
enum Behavior {
    Succeed(&'static str),
    Fail(ProviderError),
}

struct ScriptedProvider {
    name: String,
    behavior: Behavior,
    healthy: AtomicBool,
    estimate: f64,
    calls: AtomicU32,
    last_request: Mutex<Option<AdaptedRequest>>,
}

impl ScriptedProvider {
    fn build(name: &str, behavior: Behavior, healthy: bool, estimate: f64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            healthy: AtomicBool::new(healthy),
            estimate,
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        })
    }

    fn new(name: &str, behavior: Behavior) -> Arc<Self> {
        Self::build(name, behavior, true, 0.01)
    }

    fn expensive(name: &str, behavior: Behavior, estimate: f64) -> Arc<Self> {
        Self::build(name, behavior, true, estimate)
    }

    fn unhealthy(name: &str, behavior: Behavior) -> Arc<Self> {
        Self::build(name, behavior, false, 0.01)
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &AdaptedRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        match &self.behavior {
            Behavior::Succeed(content) => Ok(Completion {
                content: (*content).to_string(),
                tokens_used: 100,
                model: request.model.clone(),
            }),
            Behavior::Fail(e) => Err(e.clone()),
        }
    }

    fn list_models(&self) -> Vec<String> {
        vec![format!("{}-model", self.name)]
    }

    fn estimate_cost(&self, _tokens: u32, _model: &str) -> f64 {
        self.estimate
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────
// Fixtures
// ─────────────────────────────────────────────

fn test_config(primary: &str, fallbacks: &[&str]) -> GatewayConfig {
    GatewayConfig {
        primary_provider: primary.to_string(),
        fallback_providers: fallbacks.iter().map(|s| s.to_string()).collect(),
        max_retries: 2,
        base_retry_delay_ms: 1,
        request_timeout_secs: 5,
        health_check_timeout_secs: 1,
        ..Default::default()
    }
}

fn setup(
    config: GatewayConfig,
    providers: &[Arc<ScriptedProvider>],
) -> (GatewayManager, Arc<ModelCatalog>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let registry = Arc::new(ProviderRegistry::new());
    let catalog = Arc::new(ModelCatalog::new());
    for provider in providers {
        catalog.register(ModelDescriptor::generic(
            &provider.name,
            &format!("{}-model", provider.name),
        ));
        registry.register(Arc::clone(provider) as Arc<dyn Provider>);
    }
    let manager = GatewayManager::with_store(
        config,
        registry,
        Arc::clone(&catalog),
        Arc::new(MemoryCostStore::new()),
        Vec::new(),
    );
    (manager, catalog)
}

fn request() -> GenerationRequest {
    GenerationRequest::new("system", "user").with_max_tokens(256)
}

// ─────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────

#[tokio::test]
async fn happy_path_uses_primary() {
    let alpha = ScriptedProvider::new("alpha", Behavior::Succeed("hello from alpha"));
    let beta = ScriptedProvider::new("beta", Behavior::Succeed("hello from beta"));
    let (manager, _) = setup(test_config("alpha", &["beta"]), &[alpha.clone(), beta.clone()]);

    let response = manager.generate(&request()).await.unwrap();
    assert_eq!(response.provider, "alpha");
    assert_eq!(response.content, "hello from alpha");
    assert_eq!(response.tokens_used, 100);
    assert_eq!(alpha.calls(), 1);
    assert_eq!(beta.calls(), 0);

    let stats = manager.provider_stats();
    assert_eq!(stats["alpha"].requests, 1);
    assert_eq!(stats["alpha"].tokens, 100);
}

// Scenario A: primary fails health_check, fallback serves; primary usage
// stays at zero.
#[tokio::test]
async fn unhealthy_primary_fails_over_without_invocation() {
    let alpha = ScriptedProvider::unhealthy("alpha", Behavior::Succeed("never seen"));
    let beta = ScriptedProvider::new("beta", Behavior::Succeed("hello from beta"));
    let (manager, _) = setup(test_config("alpha", &["beta"]), &[alpha.clone(), beta.clone()]);

    let response = manager.generate(&request()).await.unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(alpha.calls(), 0);
    assert!(manager.provider_stats().get("alpha").is_none());
}

// Scenario B: per-request ceiling blocks the expensive candidate before any
// network call.
#[tokio::test]
async fn budget_refusal_skips_candidate_without_network_call() {
    let alpha = ScriptedProvider::expensive("alpha", Behavior::Succeed("pricey"), 0.50);
    let beta = ScriptedProvider::new("beta", Behavior::Succeed("cheap and cheerful"));

    let mut config = test_config("alpha", &["beta"]);
    config.cost = CostConfig {
        max_cost_per_request: 0.10,
        ..Default::default()
    };
    let (manager, _) = setup(config, &[alpha.clone(), beta.clone()]);

    let response = manager.generate(&request()).await.unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(alpha.calls(), 0);
}

#[tokio::test]
async fn budget_refusal_everywhere_is_terminal() {
    let alpha = ScriptedProvider::expensive("alpha", Behavior::Succeed("pricey"), 0.50);

    let mut config = test_config("alpha", &[]);
    config.max_retries = 1;
    config.cost = CostConfig {
        max_cost_per_request: 0.10,
        ..Default::default()
    };
    let (manager, _) = setup(config, &[alpha.clone()]);

    let err = manager.generate(&request()).await.unwrap_err();
    assert_eq!(alpha.calls(), 0);
    assert_eq!(err.attempts, 0);
    assert!(err.last_error.contains("exceeds limit"), "got: {}", err.last_error);
}

// Scenario C: every candidate transiently fails; 2 rounds x 2 providers = 4
// invocations, then one terminal error naming both.
#[tokio::test]
async fn exhaustion_raises_single_terminal_error() {
    let alpha = ScriptedProvider::new(
        "alpha",
        Behavior::Fail(ProviderError::TransientUnavailable("down".into())),
    );
    let beta = ScriptedProvider::new(
        "beta",
        Behavior::Fail(ProviderError::TransientUnavailable("also down".into())),
    );
    let (manager, _) = setup(test_config("alpha", &["beta"]), &[alpha.clone(), beta.clone()]);

    let err = manager.generate(&request()).await.unwrap_err();
    assert_eq!(alpha.calls() + beta.calls(), 4);
    assert_eq!(err.attempts, 4);
    assert!(err.providers_tried.contains(&"alpha".to_string()));
    assert!(err.providers_tried.contains(&"beta".to_string()));
    assert!(err.to_string().contains("alpha"));
    assert!(err.to_string().contains("beta"));
}

// Scenario D: the adapted request's token parameter is capped at the model
// descriptor's maximum.
#[tokio::test]
async fn adapted_request_caps_output_tokens() {
    let alpha = ScriptedProvider::new("alpha", Behavior::Succeed("capped"));
    let (manager, catalog) = setup(test_config("alpha", &[]), &[alpha.clone()]);
    catalog.register(ModelDescriptor {
        max_output_tokens: 100,
        ..ModelDescriptor::generic("alpha", "alpha-model")
    });

    let response = manager
        .generate(&request().with_max_tokens(500))
        .await
        .unwrap();
    assert_eq!(response.provider, "alpha");

    let seen = alpha.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(seen.max_tokens(), Some(100));
}

#[tokio::test]
async fn rate_limited_primary_fails_over_without_health_penalty() {
    let alpha = ScriptedProvider::new(
        "alpha",
        Behavior::Fail(ProviderError::RateLimited("429".into())),
    );
    let beta = ScriptedProvider::new("beta", Behavior::Succeed("hello from beta"));
    let (manager, _) = setup(test_config("alpha", &["beta"]), &[alpha.clone(), beta.clone()]);

    let response = manager.generate(&request()).await.unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(alpha.calls(), 1);

    // Rate limiting is not a health failure: alpha's circuit stays clean.
    let status = manager.health_status();
    let alpha_health = status.providers.get("alpha");
    assert!(alpha_health.map_or(true, |h| h.consecutive_failures == 0 && !h.circuit_open));
}

#[tokio::test]
async fn fatal_primary_fails_over_to_fallback() {
    let alpha = ScriptedProvider::new(
        "alpha",
        Behavior::Fail(ProviderError::FatalRequest("bad request".into())),
    );
    let beta = ScriptedProvider::new("beta", Behavior::Succeed("rescued"));
    let (manager, _) = setup(test_config("alpha", &["beta"]), &[alpha.clone(), beta.clone()]);

    let response = manager.generate(&request()).await.unwrap();
    assert_eq!(response.provider, "beta");
}

#[tokio::test]
async fn open_circuit_skips_provider_without_invocation() {
    let alpha = ScriptedProvider::new(
        "alpha",
        Behavior::Fail(ProviderError::TransientUnavailable("down".into())),
    );
    let mut config = test_config("alpha", &[]);
    config.max_retries = 1;
    config.breaker.failure_threshold = 2;
    let (manager, _) = setup(config, &[alpha.clone()]);

    // Two failing calls trip the breaker
    let _ = manager.generate(&request()).await;
    let _ = manager.generate(&request()).await;
    assert_eq!(alpha.calls(), 2);
    assert!(manager.health_status().providers["alpha"].circuit_open);

    // Third call is refused before any network attempt
    let err = manager.generate(&request()).await.unwrap_err();
    assert_eq!(alpha.calls(), 2);
    assert!(err.last_error.contains("circuit open"), "got: {}", err.last_error);
}

#[tokio::test]
async fn repeated_failed_rounds_open_cost_kill_switch() {
    let alpha = ScriptedProvider::new(
        "alpha",
        Behavior::Fail(ProviderError::TransientUnavailable("down".into())),
    );
    let mut config = test_config("alpha", &[]);
    config.max_retries = 1;
    config.breaker.failure_threshold = 100; // keep the health breaker out of the way
    let (manager, _) = setup(config, &[alpha.clone()]);

    for _ in 0..3 {
        let _ = manager.generate(&request()).await;
    }
    assert!(manager.cost_summary().kill_switch_open);

    let err = manager.generate(&request()).await.unwrap_err();
    assert!(err.last_error.contains("kill switch"), "got: {}", err.last_error);
}

#[tokio::test]
async fn success_updates_cost_summary() {
    let alpha = ScriptedProvider::new("alpha", Behavior::Succeed("ok"));
    let (manager, _) = setup(test_config("alpha", &[]), &[alpha.clone()]);

    manager.generate(&request()).await.unwrap();
    manager.generate(&request()).await.unwrap();

    let summary = manager.cost_summary();
    assert_eq!(summary.hourly.request_count, 2);
    assert!(summary.hourly.total_cost > 0.0);
    assert!(!summary.kill_switch_open);
}

#[tokio::test]
async fn monitoring_sweep_flags_unhealthy_provider() {
    let alpha = ScriptedProvider::unhealthy(
        "alpha",
        Behavior::Fail(ProviderError::TransientUnavailable("down".into())),
    );
    let beta = ScriptedProvider::new("beta", Behavior::Succeed("fine"));
    let (manager, _) = setup(test_config("alpha", &["beta"]), &[alpha, beta]);

    let alerts = manager.monitoring_sweep().await;
    assert!(alerts.iter().any(|a| a.source == "alpha"));
    assert!(!alerts.iter().any(|a| a.source == "beta"));

    let counts = manager.health_status().alert_counts;
    assert!(counts.values().sum::<usize>() >= 1);
}

#[tokio::test]
async fn concurrent_generates_do_not_interfere() {
    let alpha = ScriptedProvider::new("alpha", Behavior::Succeed("ok"));
    let (manager, _) = setup(test_config("alpha", &[]), &[alpha.clone()]);
    let manager = Arc::new(manager);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let m = Arc::clone(&manager);
        handles.push(tokio::spawn(async move { m.generate(&request()).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(alpha.calls(), 16);
    assert_eq!(manager.provider_stats()["alpha"].requests, 16);
    assert_eq!(manager.cost_summary().hourly.request_count, 16);
}

// Requests needing capabilities nothing in the catalog satisfies still try
// the configured list instead of refusing outright.
#[tokio::test]
async fn unsatisfiable_capabilities_fall_back_to_full_list() {
    let alpha = ScriptedProvider::new("alpha", Behavior::Succeed("best effort"));
    let (manager, _) = setup(test_config("alpha", &[]), &[alpha.clone()]);

    let mut req = request();
    req.attachments = vec!["image.png".to_string()]; // generic model lacks Vision
    let response = manager.generate(&req).await.unwrap();
    assert_eq!(response.provider, "alpha");
}
