//! Provider registry — name → instance map with a concurrent health sweep.
//!
//! Re-registering under an existing name overwrites the old instance (logged
//! as a warning, not an error). The health sweep fans out one task per
//! provider with a per-provider timeout, so one hung backend can't stall the
//! results for the rest.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::traits::Provider;

/// Process-wide map of registered providers.
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider under its own name, overwriting any previous
    /// instance with that name.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        let mut providers = self.providers.write().expect("registry lock poisoned");
        if providers.insert(name.clone(), provider).is_some() {
            warn!(provider = %name, "Re-registered provider, previous instance replaced");
        } else {
            debug!(provider = %name, "Registered provider");
        }
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// Names of all registered providers.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.read().expect("registry lock poisoned").len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `health_check` on every registered provider concurrently.
    ///
    /// Each check gets its own `per_provider_timeout`; expiry counts as
    /// unhealthy for that provider without delaying the others.
    pub async fn health_sweep(&self, per_provider_timeout: Duration) -> HashMap<String, bool> {
        let snapshot: Vec<(String, Arc<dyn Provider>)> = {
            let providers = self.providers.read().expect("registry lock poisoned");
            providers
                .iter()
                .map(|(name, p)| (name.clone(), Arc::clone(p)))
                .collect()
        };

        let mut tasks = JoinSet::new();
        for (name, provider) in snapshot {
            tasks.spawn(async move {
                let healthy = match tokio::time::timeout(per_provider_timeout, provider.health_check())
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(provider = %name, "Health check timed out, marking unhealthy");
                        false
                    }
                };
                (name, healthy)
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, healthy)) => {
                    results.insert(name, healthy);
                }
                // A panicking health check counts as unhealthy for nobody in
                // particular; the provider simply won't appear healthy.
                Err(e) => warn!(error = %e, "Health check task failed"),
            }
        }
        results
    }
}
