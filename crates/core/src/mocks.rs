//! Mock implementations of core traits for testing.
//!
//! Scripted stand-ins for the model endpoint and the speech engines, shared
//! by unit and integration tests across the workspace.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::{
    traits::{ChatModel, ContextPassage, ContextProvider, ModelOutput, SpeechSynthesizer, SpeechTranscriber},
    types::{AudioBlob, InvocationMode, ModelInvocation},
    Error, Result,
};

// =============================================================================
// Mock Chat Model
// =============================================================================

/// One scripted reply from [`MockChatModel`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    VisionUnsupported,
    Fail(String),
}

/// A recorded call to [`MockChatModel::invoke`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub mode: InvocationMode,
    pub prompt: String,
    pub image_count: usize,
    pub system_prompt: Option<String>,
}

/// Chat model that accepts or rejects images and records every call.
///
/// Scripted replies are consumed first; once the script is empty the mock
/// answers `"answer: <prompt>"`, rejecting image payloads unless it was
/// built with [`MockChatModel::vision`].
pub struct MockChatModel {
    endpoint: String,
    model: String,
    accepts_images: bool,
    reachable: AtomicBool,
    script: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<RecordedCall>>,
    list_calls: AtomicUsize,
}

impl MockChatModel {
    fn build(model: &str, accepts_images: bool) -> Self {
        Self {
            endpoint: "mock://localhost/v1".to_string(),
            model: model.to_string(),
            accepts_images,
            reachable: AtomicBool::new(true),
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// A model that accepts image payloads.
    pub fn vision(model: &str) -> Self {
        Self::build(model, true)
    }

    /// A model that rejects image payloads.
    pub fn text_only(model: &str) -> Self {
        Self::build(model, false)
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Queue replies returned before the default behaviour kicks in.
    pub fn with_script(self, replies: Vec<MockReply>) -> Self {
        self.script.lock().unwrap().extend(replies);
        self
    }

    /// Toggle whether `list_models` succeeds.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn unreachable(self) -> Self {
        self.set_reachable(false);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn modes(&self) -> Vec<InvocationMode> {
        self.calls().into_iter().map(|c| c.mode).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    fn endpoint_id(&self) -> String {
        format!("{}#{}", self.endpoint, self.model)
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(vec![self.model.clone()])
        } else {
            Err(Error::probe(self.endpoint_id(), "connection refused"))
        }
    }

    async fn invoke(&self, invocation: &ModelInvocation) -> Result<ModelOutput> {
        self.calls.lock().unwrap().push(RecordedCall {
            mode: invocation.mode,
            prompt: invocation.prompt.clone(),
            image_count: invocation.images.len(),
            system_prompt: invocation.system_prompt.clone(),
        });

        let scripted = self.script.lock().unwrap().pop_front();
        let reply = match scripted {
            Some(reply) => reply,
            None if invocation.mode == InvocationMode::Multimodal && !self.accepts_images => {
                MockReply::VisionUnsupported
            }
            None => MockReply::Text(format!("answer: {}", invocation.prompt)),
        };

        match reply {
            MockReply::Text(text) => Ok(ModelOutput::text(text)),
            MockReply::VisionUnsupported => Err(Error::vision_unsupported(
                self.endpoint_id(),
                "400 Bad Request: image_url not supported",
            )),
            MockReply::Fail(msg) => Err(Error::model_invocation(
                self.endpoint_id(),
                invocation.mode,
                msg,
            )),
        }
    }
}

// =============================================================================
// Mock Speech Engines
// =============================================================================

/// Synthesizer returning a fixed WAV header, or failing on demand.
pub struct MockSynthesizer {
    fail: bool,
    calls: AtomicUsize,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    fn name(&self) -> &str {
        "mock-tts"
    }

    async fn synthesize(&self, _text: &str) -> Result<AudioBlob> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::speech("mock synthesis failure"));
        }
        Ok(AudioBlob::wav(b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec()))
    }
}

/// Transcriber returning a fixed transcript, or failing on demand.
pub struct MockTranscriber {
    transcript: Option<String>,
}

impl MockTranscriber {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: Some(transcript.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { transcript: None }
    }
}

#[async_trait]
impl SpeechTranscriber for MockTranscriber {
    fn name(&self) -> &str {
        "mock-stt"
    }

    async fn transcribe(&self, _audio: &AudioBlob) -> Result<String> {
        self.transcript
            .clone()
            .ok_or_else(|| Error::speech("mock transcription failure"))
    }
}

// =============================================================================
// Mock Context Provider
// =============================================================================

/// Returns the same passages for every query.
#[derive(Default)]
pub struct MockContextProvider {
    passages: Vec<ContextPassage>,
}

impl MockContextProvider {
    pub fn new(passages: Vec<ContextPassage>) -> Self {
        Self { passages }
    }
}

#[async_trait]
impl ContextProvider for MockContextProvider {
    async fn retrieve(&self, _query: &str, limit: usize) -> Result<Vec<ContextPassage>> {
        Ok(self.passages.iter().take(limit).cloned().collect())
    }
}
