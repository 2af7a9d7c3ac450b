//! Persistence for cost windows, behind a storage-agnostic interface.
//!
//! The breaker logic never touches the filesystem directly; it speaks
//! [`CostStore`]. The file implementation mirrors the config loader's
//! lenient posture: a missing or corrupt file loads as "no prior usage"
//! with a warning, never an error that would block startup.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use tracing::{debug, warn};

use crate::cost::PersistedCostState;

/// A load/save key-value surface for the cost breaker's windows.
pub trait CostStore: Send + Sync {
    /// Load the persisted windows, `None` if nothing usable is stored.
    fn load(&self) -> Option<PersistedCostState>;

    /// Persist the windows. Errors are surfaced so the caller can log them.
    fn save(&self, state: &PersistedCostState) -> anyhow::Result<()>;
}

// ─────────────────────────────────────────────
// File-backed store
// ─────────────────────────────────────────────

/// JSON-file cost store (pretty-printed, camelCase, RFC 3339 timestamps).
pub struct FileCostStore {
    path: PathBuf,
}

impl FileCostStore {
    /// Create a store at the given path. Nothing is read or written yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CostStore for FileCostStore {
    fn load(&self) -> Option<PersistedCostState> {
        if !self.path.exists() {
            debug!("No cost state at {}, starting empty", self.path.display());
            return None;
        }
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read cost state {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Corrupt cost state {}, starting empty: {}", self.path.display(), e);
                None
            }
        }
    }

    fn save(&self, state: &PersistedCostState) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

// ─────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────

/// In-memory cost store, for tests and for running without persistence.
#[derive(Default)]
pub struct MemoryCostStore {
    state: Mutex<Option<PersistedCostState>>,
}

impl MemoryCostStore {
    /// An empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CostStore for MemoryCostStore {
    fn load(&self) -> Option<PersistedCostState> {
        self.state.lock().expect("store lock poisoned").clone()
    }

    fn save(&self, state: &PersistedCostState) -> anyhow::Result<()> {
        *self.state.lock().expect("store lock poisoned") = Some(state.clone());
        Ok(())
    }
}
