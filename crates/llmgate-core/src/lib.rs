//! Core types for llmgate — the data model shared by every gateway component.
//!
//! - [`types`] — requests, adapted requests, responses, usage counters
//! - [`error`] — the three-kind provider error taxonomy and [`error::TerminalError`]
//! - [`config`] — the configuration tree and its lenient JSON loader

pub mod config;
pub mod error;
pub mod types;

pub use config::GatewayConfig;
pub use error::{GateError, ProviderError, TerminalError};
pub use types::{AdaptedRequest, Completion, GenerationRequest, GenerationResponse, ProviderUsage};
