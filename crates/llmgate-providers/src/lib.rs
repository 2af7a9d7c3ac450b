//! Provider layer for llmgate.
//!
//! # Architecture
//!
//! - [`traits::Provider`] — trait that all backends implement
//! - [`catalog`] — model capability catalog + parameter adaptation
//! - [`registry`] — name → instance map with a concurrent health sweep
//! - [`http_provider::HttpProvider`] — generic OpenAI-compatible HTTP client

pub mod catalog;
pub mod http_provider;
pub mod registry;
pub mod traits;

// Re-export main types for convenience
pub use catalog::{Capability, ModelCatalog, ModelDescriptor};
pub use http_provider::HttpProvider;
pub use registry::ProviderRegistry;
pub use traits::Provider;
