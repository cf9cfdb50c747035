use serde::{Deserialize, Serialize};

use super::request::ImageBlob;

/// Payload shape sent to the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvocationMode {
    TextOnly,
    Multimodal,
}

impl InvocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationMode::TextOnly => "TEXT_ONLY",
            InvocationMode::Multimodal => "MULTIMODAL",
        }
    }
}

impl std::fmt::Display for InvocationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single call to the language model. Built per request, never persisted.
#[derive(Debug, Clone)]
pub struct ModelInvocation {
    pub mode: InvocationMode,
    pub prompt: String,
    /// Always empty for `TextOnly`.
    pub images: Vec<ImageBlob>,
    pub system_prompt: Option<String>,
    /// Overrides the endpoint's configured token limit.
    pub max_tokens: Option<u32>,
}

impl ModelInvocation {
    /// Text-only invocation.
    pub fn text_only(prompt: impl Into<String>) -> Self {
        Self {
            mode: InvocationMode::TextOnly,
            prompt: prompt.into(),
            images: Vec::new(),
            system_prompt: None,
            max_tokens: None,
        }
    }

    /// Image-bearing invocation.
    pub fn multimodal(prompt: impl Into<String>, images: Vec<ImageBlob>) -> Self {
        Self {
            mode: InvocationMode::Multimodal,
            prompt: prompt.into(),
            images,
            system_prompt: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// The same prompt with images dropped.
    pub fn into_text_only(self) -> Self {
        Self {
            mode: InvocationMode::TextOnly,
            images: Vec::new(),
            ..self
        }
    }
}
