//! Resilience layer for llmgate: circuit breakers, spend control, alerting,
//! and the failover orchestrator.
//!
//! # Architecture
//!
//! - [`health::HealthBreaker`] — per-provider consecutive-failure circuit
//! - [`cost::CostBreaker`] — hour/day/month spend windows + kill switch
//! - [`store`] — persistence behind the [`store::CostStore`] trait
//! - [`monitor::Monitor`] — threshold alerting with dedup and channels
//! - [`manager::GatewayManager`] — the `generate()` entry point

pub mod cost;
pub mod health;
pub mod manager;
pub mod monitor;
pub mod store;

// Re-export main types for convenience
pub use cost::{CostBreaker, CostSummary, CostWindow, PersistedCostState};
pub use health::HealthBreaker;
pub use manager::{GatewayManager, SystemHealthStatus};
pub use monitor::{Alert, AlertChannel, AlertSeverity, GatewaySnapshot, Monitor};
pub use store::{CostStore, FileCostStore, MemoryCostStore};
