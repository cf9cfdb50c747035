//! OpenAI-compatible chat client.
//!
//! Talks to any `/v1/chat/completions` server (LM Studio, llama.cpp server,
//! vLLM). Text-only invocations send `content` as a string; multimodal
//! invocations send an array of text and `image_url` parts with base64 data
//! URLs.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use vox_core::{
    config::LlmConfig,
    traits::{ChatModel, LlmUsage, ModelOutput},
    types::{ImageBlob, InvocationMode, ModelInvocation},
    Error, Result,
};

/// Body fragments that tie a client error to the image field.
const VISION_ERROR_MARKERS: &[&str] = &["image", "vision", "multimodal", "multi-modal"];

/// Longest error body we carry into an error message.
const MAX_ERROR_BODY: usize = 300;

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct WireMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<UsageDto>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageDto {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// =============================================================================
// Client
// =============================================================================

/// Chat client for an OpenAI-compatible endpoint.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<Secret<String>>,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatClient {
    /// Create a client from the `[llm]` configuration section.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config
                .api_key
                .as_ref()
                .filter(|k| !k.expose_secret().trim().is_empty())
                .cloned(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }

    /// Build the request body for an invocation.
    pub(crate) fn build_payload<'a>(&'a self, invocation: &ModelInvocation) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &invocation.system_prompt {
            messages.push(WireMessage {
                role: "system",
                content: MessageContent::Text(system.clone()),
            });
        }

        let content = match invocation.mode {
            InvocationMode::TextOnly => MessageContent::Text(invocation.prompt.clone()),
            InvocationMode::Multimodal => {
                let mut parts = Vec::with_capacity(invocation.images.len() + 1);
                parts.push(ContentPart::Text {
                    text: invocation.prompt.clone(),
                });
                parts.extend(invocation.images.iter().map(|image| ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url(image),
                    },
                }));
                MessageContent::Parts(parts)
            }
        };
        messages.push(WireMessage {
            role: "user",
            content,
        });

        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: invocation.max_tokens.unwrap_or(self.max_tokens),
            stream: false,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatClient {
    fn endpoint_id(&self) -> String {
        format!("{}#{}", self.base_url, self.model)
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let endpoint = self.endpoint_id();
        let response = self
            .authorize(self.http.get(self.url("models")))
            .send()
            .await
            .map_err(|e| Error::probe(&endpoint, format!("endpoint unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::probe(&endpoint, format!("GET /models returned {}", status)));
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| Error::probe(&endpoint, format!("invalid /models body: {}", e)))?;

        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    async fn invoke(&self, invocation: &ModelInvocation) -> Result<ModelOutput> {
        let endpoint = self.endpoint_id();
        let mode = invocation.mode;
        let payload = self.build_payload(invocation);

        tracing::debug!(
            endpoint = %endpoint,
            mode = %mode,
            images = invocation.images.len(),
            prompt_len = invocation.prompt.len(),
            "Calling chat completions"
        );

        let response = self
            .authorize(self.http.post(self.url("chat/completions")))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::model_invocation(&endpoint, mode, format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(&endpoint, mode, status, &body));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::model_invocation(&endpoint, mode, format!("invalid response body: {}", e)))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::model_invocation(&endpoint, mode, "response contained no choices"))?;

        let content = choice.message.content.unwrap_or_default();
        tracing::info!(endpoint = %endpoint, mode = %mode, chars = content.len(), "Generated response");

        Ok(ModelOutput {
            content,
            finish_reason: choice.finish_reason,
            usage: body
                .usage
                .map(|u| LlmUsage {
                    prompt_tokens: u.prompt_tokens,
                    completion_tokens: u.completion_tokens,
                    total_tokens: u.total_tokens,
                })
                .unwrap_or_default(),
        })
    }
}

/// Map a non-2xx reply to the error taxonomy.
///
/// A 400 on an image-bearing payload is read as "vision unsupported", the
/// signal LM Studio and llama.cpp emit for text-only models. 415 and 422 count
/// only when the body names the image field.
pub fn classify_failure(endpoint: &str, mode: InvocationMode, status: StatusCode, body: &str) -> Error {
    let detail = format!("HTTP {}: {}", status.as_u16(), truncate(body.trim(), MAX_ERROR_BODY));

    if mode == InvocationMode::Multimodal {
        let lowered = body.to_lowercase();
        let mentions_image = VISION_ERROR_MARKERS.iter().any(|m| lowered.contains(m));
        let vision_status = match status {
            StatusCode::BAD_REQUEST => true,
            StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::UNPROCESSABLE_ENTITY => mentions_image,
            _ => false,
        };
        if vision_status {
            return Error::vision_unsupported(endpoint, detail);
        }
    }

    Error::model_invocation(endpoint, mode, detail)
}

/// Encode an image as a `data:` URL, sniffing the MIME type when absent.
pub fn data_url(image: &ImageBlob) -> String {
    let mime = image
        .mime_type
        .clone()
        .filter(|m| m.starts_with("image/"))
        .or_else(|| {
            image::guess_format(&image.data)
                .ok()
                .map(|f| f.to_mime_type().to_string())
        })
        .unwrap_or_else(|| "image/png".to_string());

    let encoded = base64::engine::general_purpose::STANDARD.encode(&image.data);
    format!("data:{};base64,{}", mime, encoded)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
