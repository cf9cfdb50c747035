#![deny(unused)]
//! Model Gateway for Vox Agent.
//!
//! This crate provides:
//! - An OpenAI-compatible chat client with text-only and image-bearing payloads
//! - Classification of endpoint errors into the shared taxonomy
//! - Capability probing with a shared, TTL-aware cache

pub mod capability;
pub mod openai;

pub use capability::{looks_like_vlm, CapabilityCache, CapabilityProber};
pub use openai::OpenAiCompatClient;

use std::sync::Arc;

use vox_core::{config::LlmConfig, traits::ChatModel, Result};

/// Build the endpoint client and a prober sharing `cache`.
pub fn create_from_config(
    config: &LlmConfig,
    cache: Arc<CapabilityCache>,
) -> Result<(Arc<dyn ChatModel>, CapabilityProber)> {
    let client: Arc<dyn ChatModel> = Arc::new(OpenAiCompatClient::from_config(config)?);
    let prober = CapabilityProber::from_config(client.clone(), cache, config);
    Ok((client, prober))
}
