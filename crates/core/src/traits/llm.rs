//! Language-model endpoint traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::ModelInvocation;

/// Chat-style language model endpoint.
///
/// Implementations must report an image payload rejected by the endpoint as
/// [`crate::Error::VisionUnsupported`] so callers can fall back to text.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Stable identity of the endpoint, used as the capability cache key.
    fn endpoint_id(&self) -> String;

    /// Configured model name.
    fn model(&self) -> &str;

    /// List the models served by the endpoint. Doubles as a reachability check.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Run one invocation and return the generated text.
    async fn invoke(&self, invocation: &ModelInvocation) -> Result<ModelOutput>;
}

/// Output of a model invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutput {
    /// Generated content.
    pub content: String,
    /// Finish reason reported by the endpoint.
    pub finish_reason: Option<String>,
    /// Token usage, when the endpoint reports it.
    pub usage: LlmUsage,
}

impl ModelOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            finish_reason: Some("stop".to_string()),
            usage: LlmUsage::default(),
        }
    }
}

/// Token usage from an LLM call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}
