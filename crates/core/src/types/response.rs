use super::{invocation::InvocationMode, request::AudioBlob};

/// Final payload returned to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    pub answer_text: String,
    /// Synthesized speech, when requested and available.
    pub audio: Option<AudioBlob>,
    /// True if images were supplied but not shown to the model.
    pub degraded: bool,
    /// Mode of the invocation that produced `answer_text`.
    pub mode: InvocationMode,
    /// Transcript of spoken input, if any.
    pub transcript: Option<String>,
}

impl Response {
    /// A plain text answer.
    pub fn text(answer: impl Into<String>) -> Self {
        Self {
            answer_text: answer.into(),
            audio: None,
            degraded: false,
            mode: InvocationMode::TextOnly,
            transcript: None,
        }
    }

    pub fn with_audio(mut self, audio: Option<AudioBlob>) -> Self {
        self.audio = audio;
        self
    }
}
