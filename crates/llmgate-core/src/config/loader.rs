//! Config loader — reads a JSON file and applies env overrides.
//!
//! A missing or unparseable file is never fatal: the gateway starts with
//! defaults and a warning, so a corrupt config can't take the service down.
//!
//! # Loading precedence
//! 1. Defaults (from `GatewayConfig::default()`)
//! 2. JSON file at the given path
//! 3. Environment variables `LLMGATE_PRIMARY_PROVIDER`, `LLMGATE_COST_STATE_PATH`

use std::path::Path;
use tracing::{debug, info, warn};

use super::schema::GatewayConfig;

/// Load configuration from a file path, falling back to defaults.
pub fn load_config(path: Option<&Path>) -> GatewayConfig {
    let config = match path {
        Some(p) => load_config_from_path(p),
        None => {
            info!("No config path given, using defaults");
            GatewayConfig::default()
        }
    };
    apply_env_overrides(config)
}

fn load_config_from_path(path: &Path) -> GatewayConfig {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return GatewayConfig::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return GatewayConfig::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            GatewayConfig::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &GatewayConfig, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)
}

/// Apply environment-variable overrides on top of a loaded config.
fn apply_env_overrides(mut config: GatewayConfig) -> GatewayConfig {
    if let Ok(primary) = std::env::var("LLMGATE_PRIMARY_PROVIDER") {
        if !primary.is_empty() {
            debug!("Overriding primary provider from env: {}", primary);
            config.primary_provider = primary;
        }
    }
    if let Ok(state_path) = std::env::var("LLMGATE_COST_STATE_PATH") {
        if !state_path.is_empty() {
            config.cost.state_path = state_path;
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = load_config(Some(Path::new("/nonexistent/llmgate.json")));
        assert_eq!(config.max_retries, GatewayConfig::default().max_retries);
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not valid json").unwrap();
        let config = load_config(Some(&path));
        assert_eq!(config.primary_provider, GatewayConfig::default().primary_provider);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = GatewayConfig::default();
        config.primary_provider = "anthropic".to_string();
        config.fallback_providers = vec!["openai".to_string()];
        config.cost.max_hourly_cost = 2.5;

        save_config(&config, &path).unwrap();
        let loaded = load_config(Some(&path));
        assert_eq!(loaded.primary_provider, "anthropic");
        assert_eq!(loaded.fallback_providers, vec!["openai"]);
        assert_eq!(loaded.cost.max_hourly_cost, 2.5);
    }
}
