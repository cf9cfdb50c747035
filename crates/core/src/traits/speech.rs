//! Speech engine traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::AudioBlob;

/// Text-in, audio-out.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<AudioBlob>;
}

/// Audio-in, text-out.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: &AudioBlob) -> Result<String>;
}
