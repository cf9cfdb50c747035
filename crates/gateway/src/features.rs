//! Optional-feature gate for speech input and output.
//!
//! Text-to-speech and speech-to-text are each optional. A missing engine
//! never blocks the text answer: speech output is dropped with a warning,
//! and transcription reports [`Error::FeatureUnavailable`] so the caller can
//! decide whether the request is still answerable.

use std::sync::Arc;

use vox_core::{
    config::SpeechConfig,
    traits::{SpeechSynthesizer, SpeechTranscriber},
    types::{AudioBlob, Response},
    Error, Result,
};

use crate::audio::{PiperSynthesizer, WhisperCliTranscriber};

pub const TTS: &str = "tts";
pub const STT: &str = "stt";

/// Wraps the optional speech engines.
#[derive(Clone, Default)]
pub struct FeatureGate {
    tts: Option<Arc<dyn SpeechSynthesizer>>,
    stt: Option<Arc<dyn SpeechTranscriber>>,
}

impl FeatureGate {
    /// Gate with both features disabled.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(tts: Option<Arc<dyn SpeechSynthesizer>>, stt: Option<Arc<dyn SpeechTranscriber>>) -> Self {
        Self { tts, stt }
    }

    /// Build the Piper and whisper.cpp engines the configuration allows.
    ///
    /// An enabled feature whose settings are missing is disabled with a warning.
    pub fn from_config(config: &SpeechConfig) -> Self {
        let tts: Option<Arc<dyn SpeechSynthesizer>> = if !config.tts_enabled {
            tracing::info!(feature = TTS, "Text-to-speech disabled by configuration");
            None
        } else {
            match PiperSynthesizer::from_config(config) {
                Ok(engine) => {
                    tracing::info!(feature = TTS, binary = %config.piper_binary, "Piper TTS enabled");
                    Some(Arc::new(engine))
                }
                Err(e) => {
                    tracing::warn!(feature = TTS, reason = %e, "Piper TTS not configured. Text-to-speech will not be available.");
                    None
                }
            }
        };

        let stt: Option<Arc<dyn SpeechTranscriber>> = if !config.stt_enabled {
            tracing::info!(feature = STT, "Speech-to-text disabled by configuration");
            None
        } else {
            match WhisperCliTranscriber::from_config(config) {
                Ok(engine) => {
                    tracing::info!(feature = STT, binary = %config.whisper_binary, "whisper.cpp STT enabled");
                    Some(Arc::new(engine))
                }
                Err(e) => {
                    tracing::warn!(feature = STT, reason = %e, "Whisper not configured. Audio transcription will not be available.");
                    None
                }
            }
        };

        Self { tts, stt }
    }

    pub fn tts_available(&self) -> bool {
        self.tts.is_some()
    }

    pub fn stt_available(&self) -> bool {
        self.stt.is_some()
    }

    /// Synthesize speech, surfacing failures. Used by the standalone TTS endpoint.
    pub async fn synthesize(&self, text: &str) -> Result<AudioBlob> {
        let engine = self.tts.as_ref().ok_or_else(|| {
            vox_governance::track_feature_unavailable(TTS);
            Error::feature_unavailable(TTS)
        })?;
        engine.synthesize(text).await
    }

    /// Speech for an answer, or `None` when TTS is absent or fails.
    pub async fn speech_for(&self, text: &str) -> Option<AudioBlob> {
        if text.trim().is_empty() {
            return None;
        }
        let Some(engine) = self.tts.as_ref() else {
            tracing::warn!(feature = TTS, "Speech requested but TTS is not configured; returning text only");
            vox_governance::track_feature_unavailable(TTS);
            return None;
        };

        match engine.synthesize(text).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(feature = TTS, engine = engine.name(), error = %e, "Speech synthesis failed; returning text only");
                None
            }
        }
    }

    /// Wrap an answer in a [`Response`], attaching speech when available.
    pub async fn with_speech(&self, response_text: impl Into<String>) -> Response {
        let answer = response_text.into();
        let audio = self.speech_for(&answer).await;
        Response::text(answer).with_audio(audio)
    }

    /// Transcribe spoken input.
    pub async fn transcribe(&self, audio: &AudioBlob) -> Result<String> {
        let Some(engine) = self.stt.as_ref() else {
            tracing::warn!(feature = STT, "Audio attached but STT is not configured");
            vox_governance::track_feature_unavailable(STT);
            return Err(Error::feature_unavailable(STT));
        };
        if audio.is_empty() {
            return Err(Error::invalid_request("Empty audio file."));
        }

        engine.transcribe(audio).await.map(|text| text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vox_core::mocks::{MockSynthesizer, MockTranscriber};

    #[tokio::test]
    async fn test_disabled_tts_keeps_answer() {
        let gate = FeatureGate::disabled();
        let response = gate.with_speech("The image shows a cat.").await;
        assert_eq!(response.answer_text, "The image shows a cat.");
        assert!(response.audio.is_none());
        assert!(!response.degraded);
    }

    #[tokio::test]
    async fn test_failing_tts_keeps_answer() {
        let gate = FeatureGate::new(Some(Arc::new(MockSynthesizer::failing())), None);
        let response = gate.with_speech("hello").await;
        assert_eq!(response.answer_text, "hello");
        assert!(response.audio.is_none());
    }

    #[tokio::test]
    async fn test_tts_attaches_audio() {
        let tts = Arc::new(MockSynthesizer::new());
        let gate = FeatureGate::new(Some(tts.clone()), None);
        let response = gate.with_speech("hello").await;
        assert!(response.audio.is_some());

        // Blank answers are never synthesized.
        assert!(gate.with_speech("  ").await.audio.is_none());
        assert_eq!(tts.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transcribe_without_engine() {
        let gate = FeatureGate::disabled();
        let err = gate.transcribe(&AudioBlob::wav(vec![1u8, 2, 3])).await.unwrap_err();
        assert!(matches!(err, Error::FeatureUnavailable { ref feature } if feature == STT));
    }

    #[tokio::test]
    async fn test_transcribe_trims() {
        let gate = FeatureGate::new(None, Some(Arc::new(MockTranscriber::new("  hi there \n"))));
        assert_eq!(gate.transcribe(&AudioBlob::wav(vec![1u8])).await.unwrap(), "hi there");
    }

    #[tokio::test]
    async fn test_synthesize_without_engine_is_unavailable() {
        let err = FeatureGate::disabled().synthesize("hi").await.unwrap_err();
        assert!(matches!(err, Error::FeatureUnavailable { .. }));
    }

    #[test]
    fn test_from_config_disables_unset_engines() {
        let gate = FeatureGate::from_config(&SpeechConfig::default());
        assert!(!gate.tts_available());
        assert!(!gate.stt_available());

        let gate = FeatureGate::from_config(&SpeechConfig {
            tts_enabled: false,
            stt_enabled: false,
            ..Default::default()
        });
        assert!(!gate.tts_available());
        assert!(!gate.stt_available());
    }
}
