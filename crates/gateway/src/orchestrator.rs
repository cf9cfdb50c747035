//! Fallback orchestration for multimodal queries.
//!
//! Per request: transcribe spoken input, admit image attachments, consult
//! the capability prober to choose between a multimodal and a text-only call,
//! retry once as text-only when the endpoint rejects the images, and
//! optionally speak the answer.

use std::sync::Arc;

use vox_core::{
    config::OrchestratorConfig,
    traits::{ChatModel, ContextPassage, ContextProvider, ModelOutput},
    types::{ImageBlob, InvocationMode, ModelInvocation, Request, Response},
    Error, Result,
};
use vox_model_gateway::CapabilityProber;

use crate::features::FeatureGate;
use crate::vision::ImageIntake;

const DOCUMENT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant with expertise in analyzing documents. \
Use the provided context to answer questions accurately. If the answer cannot be found in the context, \
say so clearly. Always cite which document your answer comes from.";

const MULTIMODAL_SYSTEM_PROMPT: &str = "You are a helpful AI assistant with expertise in analyzing documents and images. \
Use the provided context and images to answer questions accurately. Analyze both the text context \
and the visual information in the images. If the answer cannot be found, say so clearly. \
Always cite which document or image your answer comes from.";

/// Routes a [`Request`] to the model and degrades gracefully.
pub struct FallbackOrchestrator {
    model: Arc<dyn ChatModel>,
    prober: Arc<CapabilityProber>,
    gate: Arc<FeatureGate>,
    intake: ImageIntake,
    context: Option<Arc<dyn ContextProvider>>,
    context_limit: usize,
}

impl FallbackOrchestrator {
    pub fn new(model: Arc<dyn ChatModel>, prober: Arc<CapabilityProber>, gate: Arc<FeatureGate>) -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            model,
            prober,
            gate,
            intake: ImageIntake::new(defaults.max_images),
            context: None,
            context_limit: defaults.context_limit,
        }
    }

    /// Apply the `[orchestrator]` section.
    pub fn with_config(mut self, config: &OrchestratorConfig) -> Self {
        self.intake = ImageIntake::new(config.max_images);
        self.context_limit = config.context_limit;
        self
    }

    /// Ground answers in passages from `provider`.
    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(provider);
        self
    }

    pub fn gate(&self) -> &FeatureGate {
        &self.gate
    }

    /// Answer a request, speaking the answer when `speak` is set.
    ///
    /// Only a failed model call fails the request (as
    /// [`Error::ModelInvocation`]), apart from requests with no derivable text.
    pub async fn handle(&self, request: Request, speak: bool) -> Result<Response> {
        request.validate()?;
        let Request {
            query_text,
            attached_images,
            attached_audio,
        } = request;

        let (query, transcript) = self.resolve_query(query_text, attached_audio).await?;

        let images_supplied = !attached_images.is_empty();
        let intake = self.intake.admit(attached_images);
        // Every attachment was unreadable: the model cannot see what was asked about.
        let mut degraded = images_supplied && !intake.has_images();

        let mode = if intake.has_images() {
            self.select_mode().await
        } else {
            InvocationMode::TextOnly
        };
        if images_supplied && mode == InvocationMode::TextOnly {
            degraded = true;
        }

        let passages = self.retrieve(&query).await;
        let invocation = compose(&query, &passages, mode, intake.accepted);

        let (output, final_mode) = match self.model.invoke(&invocation).await {
            Ok(output) => (output, mode),
            Err(Error::VisionUnsupported { detail, .. }) if mode == InvocationMode::Multimodal => {
                degraded = true;
                (self.retry_text_only(&query, &passages, &detail).await?, InvocationMode::TextOnly)
            }
            Err(e) => return Err(self.surface(e, mode)),
        };

        let mut response = if speak {
            self.gate.with_speech(output.content).await
        } else {
            Response::text(output.content)
        };
        response.degraded = degraded;
        response.mode = final_mode;
        response.transcript = transcript;

        vox_governance::track_query(final_mode, degraded);
        tracing::info!(
            endpoint = %self.model.endpoint_id(),
            mode = %final_mode,
            degraded,
            audio = response.audio.is_some(),
            "Query answered"
        );
        Ok(response)
    }

    /// Multimodal when the endpoint supports it; text-only otherwise or when
    /// its capability is unknown.
    async fn select_mode(&self) -> InvocationMode {
        let endpoint = self.prober.endpoint_id();
        match self.prober.probe(false).await {
            Ok(profile) if profile.supports_multimodal => {
                vox_governance::track_probe(&endpoint, "multimodal");
                InvocationMode::Multimodal
            }
            Ok(_) => {
                vox_governance::track_probe(&endpoint, "text_only");
                tracing::warn!(
                    endpoint = %endpoint,
                    requested_mode = %InvocationMode::Multimodal,
                    "Model does not support vision; images will be ignored"
                );
                InvocationMode::TextOnly
            }
            Err(e) => {
                vox_governance::track_probe(&endpoint, "error");
                tracing::warn!(
                    endpoint = %endpoint,
                    requested_mode = %InvocationMode::Multimodal,
                    error = %e,
                    "Capability unknown; assuming text-only"
                );
                InvocationMode::TextOnly
            }
        }
    }

    async fn retry_text_only(&self, query: &str, passages: &[ContextPassage], detail: &str) -> Result<ModelOutput> {
        let endpoint = self.model.endpoint_id();
        tracing::warn!(
            endpoint = %endpoint,
            requested_mode = %InvocationMode::Multimodal,
            detail = %detail,
            "Endpoint rejected images; retrying once as text-only"
        );
        self.prober.mark_text_only(detail);
        vox_governance::track_vision_fallback(&endpoint);

        let retry = compose(query, passages, InvocationMode::TextOnly, Vec::new());
        self.model
            .invoke(&retry)
            .await
            .map_err(|e| self.surface(e, InvocationMode::TextOnly))
    }

    /// Combine typed text with a transcript of the attached audio.
    async fn resolve_query(
        &self,
        typed: String,
        audio: Option<vox_core::types::AudioBlob>,
    ) -> Result<(String, Option<String>)> {
        let typed = typed.trim().to_string();
        let Some(audio) = audio.filter(|a| !a.is_empty()) else {
            return Ok((typed, None));
        };

        match self.gate.transcribe(&audio).await {
            Ok(transcript) if !transcript.is_empty() => {
                let query = if typed.is_empty() {
                    transcript.clone()
                } else {
                    format!("{}\n\n{}", typed, transcript)
                };
                Ok((query, Some(transcript)))
            }
            Ok(_) if typed.is_empty() => Err(Error::invalid_request("transcription produced no text")),
            Ok(_) => Ok((typed, None)),
            Err(e) if typed.is_empty() => match e {
                Error::FeatureUnavailable { .. } | Error::InvalidRequest(_) => Err(e),
                other => Err(Error::invalid_request(format!("audio could not be transcribed: {}", other))),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Transcription failed; answering typed text only");
                Ok((typed, None))
            }
        }
    }

    async fn retrieve(&self, query: &str) -> Vec<ContextPassage> {
        let Some(provider) = &self.context else {
            return Vec::new();
        };
        match provider.retrieve(query, self.context_limit).await {
            Ok(passages) => {
                tracing::info!(count = passages.len(), "Retrieved context documents");
                passages
            }
            Err(e) => {
                tracing::warn!(error = %e, "Context retrieval failed; answering without context");
                Vec::new()
            }
        }
    }

    /// Every model-call failure leaves here as `ModelInvocation`.
    fn surface(&self, error: Error, mode: InvocationMode) -> Error {
        let endpoint = self.model.endpoint_id();
        let error = match error {
            e @ Error::ModelInvocation { .. } => e,
            Error::VisionUnsupported { detail, .. } => Error::model_invocation(&endpoint, mode, detail),
            other => Error::model_invocation(&endpoint, mode, other.to_string()),
        };
        tracing::error!(endpoint = %endpoint, mode = %mode, error = %error, "Model invocation failed");
        error
    }
}

/// Build the invocation for `mode`, with retrieval context when present.
fn compose(query: &str, passages: &[ContextPassage], mode: InvocationMode, images: Vec<ImageBlob>) -> ModelInvocation {
    if passages.is_empty() {
        return match mode {
            InvocationMode::TextOnly => ModelInvocation::text_only(query),
            InvocationMode::Multimodal => ModelInvocation::multimodal(query, images),
        };
    }

    let context_text = passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[Document {} - {}]\n{}", i + 1, p.source, p.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    match mode {
        InvocationMode::TextOnly => ModelInvocation::text_only(format!(
            "Context Information:\n{}\n\nUser Question: {}\n\n\
             Please provide a detailed and accurate answer based on the context above.",
            context_text, query
        ))
        .with_system_prompt(DOCUMENT_SYSTEM_PROMPT),
        InvocationMode::Multimodal => ModelInvocation::multimodal(
            format!(
                "Context Information:\n{}\n\nUser Question: {}\n\n\
                 Please analyze the provided images along with the context above and provide a detailed answer.",
                context_text, query
            ),
            images,
        )
        .with_system_prompt(MULTIMODAL_SYSTEM_PROMPT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::test_support::png;
    use vox_core::config::ProbeStrategy;
    use vox_core::mocks::{MockChatModel, MockContextProvider, MockReply, MockSynthesizer, MockTranscriber};
    use vox_core::types::AudioBlob;
    use vox_model_gateway::CapabilityCache;

    fn orchestrator(llm: Arc<MockChatModel>, gate: FeatureGate) -> FallbackOrchestrator {
        let prober = CapabilityProber::new(llm.clone(), Arc::new(CapabilityCache::default()))
            .with_strategy(ProbeStrategy::Heuristic);
        FallbackOrchestrator::new(llm, Arc::new(prober), Arc::new(gate))
    }

    fn image_request(text: &str) -> Request {
        Request::text(text).with_image(ImageBlob::new(png(2, 2)))
    }

    #[tokio::test]
    async fn test_no_images_is_text_only_even_on_vlm() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let response = orch.handle(Request::text("hello"), false).await.unwrap();
        assert_eq!(response.mode, InvocationMode::TextOnly);
        assert!(!response.degraded);
        assert_eq!(llm.modes(), vec![InvocationMode::TextOnly]);
        // No images: the prober is never consulted.
        assert_eq!(llm.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_images_with_vlm_are_multimodal() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let response = orch.handle(image_request("What is in this image?"), false).await.unwrap();
        assert_eq!(response.mode, InvocationMode::Multimodal);
        assert!(!response.degraded);
        assert_eq!(response.answer_text, "answer: What is in this image?");
        assert_eq!(llm.calls()[0].image_count, 1);
    }

    #[tokio::test]
    async fn test_images_with_text_model_degrade() {
        let llm = Arc::new(MockChatModel::text_only("liquid/lfm2-1.2b"));
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let response = orch.handle(image_request("What is in this image?"), false).await.unwrap();
        assert_eq!(response.mode, InvocationMode::TextOnly);
        assert!(response.degraded);
        assert_eq!(response.answer_text, "answer: What is in this image?");
        assert_eq!(llm.calls()[0].image_count, 0);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_failure_assumes_text_only() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b").unreachable());
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let response = orch.handle(image_request("describe"), false).await.unwrap();
        assert_eq!(response.mode, InvocationMode::TextOnly);
        assert!(response.degraded);
    }

    #[tokio::test]
    async fn test_vision_rejection_retries_exactly_once() {
        // Name says VLM, endpoint says otherwise.
        let llm = Arc::new(MockChatModel::text_only("llava-v1.6-mistral-7b"));
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let response = orch.handle(image_request("describe"), false).await.unwrap();
        assert_eq!(
            llm.modes(),
            vec![InvocationMode::Multimodal, InvocationMode::TextOnly]
        );
        assert_eq!(response.mode, InvocationMode::TextOnly);
        assert!(response.degraded);

        // The mismatch is remembered: the next request goes straight to text.
        orch.handle(image_request("again"), false).await.unwrap();
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.modes()[2], InvocationMode::TextOnly);
    }

    #[tokio::test]
    async fn test_failed_retry_is_model_invocation_error() {
        let llm = Arc::new(
            MockChatModel::vision("qwen/qwen3-vl-4b")
                .with_script(vec![MockReply::VisionUnsupported, MockReply::VisionUnsupported]),
        );
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let err = orch.handle(image_request("describe"), false).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ModelInvocation {
                mode: InvocationMode::TextOnly,
                ..
            }
        ));
        assert_eq!(llm.call_count(), 2);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let llm = Arc::new(
            MockChatModel::vision("qwen/qwen3-vl-4b").with_script(vec![MockReply::Fail("HTTP 500".into())]),
        );
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let err = orch.handle(image_request("describe"), false).await.unwrap_err();
        assert!(matches!(err, Error::ModelInvocation { .. }));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_images_degrade_to_text() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let request = Request::text("describe").with_image(ImageBlob::new(b"junk".to_vec()));
        let response = orch.handle(request, false).await.unwrap();
        assert_eq!(response.mode, InvocationMode::TextOnly);
        assert!(response.degraded);
    }

    #[tokio::test]
    async fn test_image_limit_applies() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let orch = orchestrator(llm.clone(), FeatureGate::disabled()).with_config(&OrchestratorConfig {
            max_images: 1,
            ..Default::default()
        });

        let request = image_request("compare").with_image(ImageBlob::new(png(3, 3)));
        let response = orch.handle(request, false).await.unwrap();
        assert_eq!(response.mode, InvocationMode::Multimodal);
        assert_eq!(llm.calls()[0].image_count, 1);
    }

    #[tokio::test]
    async fn test_audio_without_stt_is_rejected() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let orch = orchestrator(llm.clone(), FeatureGate::disabled());

        let err = orch
            .handle(Request::audio(AudioBlob::wav(vec![1u8, 2, 3])), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FeatureUnavailable { .. }));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_transcription_without_text_is_invalid() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let gate = FeatureGate::new(None, Some(Arc::new(MockTranscriber::failing())));
        let orch = orchestrator(llm, gate);

        let err = orch
            .handle(Request::audio(AudioBlob::wav(vec![1u8])), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_failed_transcription_with_text_continues() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let gate = FeatureGate::new(None, Some(Arc::new(MockTranscriber::failing())));
        let orch = orchestrator(llm, gate);

        let request = Request::text("typed question").with_audio(AudioBlob::wav(vec![1u8]));
        let response = orch.handle(request, false).await.unwrap();
        assert_eq!(response.answer_text, "answer: typed question");
        assert!(response.transcript.is_none());
    }

    #[tokio::test]
    async fn test_transcript_becomes_query() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let gate = FeatureGate::new(None, Some(Arc::new(MockTranscriber::new("what time is it"))));
        let orch = orchestrator(llm, gate);

        let response = orch
            .handle(Request::audio(AudioBlob::wav(vec![1u8])), false)
            .await
            .unwrap();
        assert_eq!(response.answer_text, "answer: what time is it");
        assert_eq!(response.transcript.as_deref(), Some("what time is it"));
    }

    #[tokio::test]
    async fn test_speech_output_and_disabled_tts() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let tts = Arc::new(MockSynthesizer::new());
        let orch = orchestrator(llm.clone(), FeatureGate::new(Some(tts.clone()), None));
        let response = orch.handle(Request::text("hi"), true).await.unwrap();
        assert!(response.audio.is_some());
        assert_eq!(tts.call_count(), 1);

        let orch = orchestrator(llm, FeatureGate::disabled());
        let response = orch.handle(Request::text("hi"), true).await.unwrap();
        assert_eq!(response.answer_text, "answer: hi");
        assert!(response.audio.is_none());
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
        let orch = orchestrator(llm, FeatureGate::disabled());
        assert!(matches!(
            orch.handle(Request::text(""), false).await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_context_shapes_prompt_and_retry() {
        let llm = Arc::new(MockChatModel::text_only("llava-v1.6-mistral-7b"));
        let context = Arc::new(MockContextProvider::new(vec![ContextPassage {
            source: "report.pdf".into(),
            content: "Revenue grew 12%.".into(),
        }]));
        let orch = orchestrator(llm.clone(), FeatureGate::disabled()).with_context_provider(context);

        orch.handle(image_request("How did revenue change?"), false).await.unwrap();
        let calls = llm.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].prompt.contains("analyze the provided images"));
        assert_eq!(calls[0].system_prompt.as_deref(), Some(MULTIMODAL_SYSTEM_PROMPT));
        // The text-only retry is re-rendered without image instructions.
        assert!(calls[1].prompt.contains("[Document 1 - report.pdf]\nRevenue grew 12%."));
        assert!(!calls[1].prompt.contains("images"));
        assert_eq!(calls[1].system_prompt.as_deref(), Some(DOCUMENT_SYSTEM_PROMPT));
    }
}
