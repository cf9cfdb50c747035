use bytes::Bytes;

// =============================================================================
// Attachments
// =============================================================================

/// Raw image attachment as uploaded by the client.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBlob {
    /// Encoded image bytes (PNG, JPEG, ...).
    pub data: Bytes,
    /// MIME type if the client supplied or we sniffed one.
    pub mime_type: Option<String>,
}

impl ImageBlob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBlob")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Raw audio clip, either spoken input or synthesized output.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioBlob {
    /// Encoded audio bytes.
    pub data: Bytes,
    /// MIME type, e.g. `audio/wav`.
    pub mime_type: Option<String>,
}

impl AudioBlob {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            mime_type: None,
        }
    }

    /// A WAV clip, the format Piper produces.
    pub fn wav(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            mime_type: Some("audio/wav".to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for AudioBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBlob")
            .field("bytes", &self.data.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

// =============================================================================
// Request
// =============================================================================

/// A user query: text, optionally with images and/or spoken audio.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Typed query. May be empty when audio is attached.
    pub query_text: String,
    /// Images in the order the user attached them.
    pub attached_images: Vec<ImageBlob>,
    /// Spoken query to be transcribed.
    pub attached_audio: Option<AudioBlob>,
}

impl Request {
    /// Create a text-only request.
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query_text: query.into(),
            ..Default::default()
        }
    }

    /// Create a request carrying only audio.
    pub fn audio(clip: AudioBlob) -> Self {
        Self {
            attached_audio: Some(clip),
            ..Default::default()
        }
    }

    /// Attach an image.
    pub fn with_image(mut self, image: ImageBlob) -> Self {
        self.attached_images.push(image);
        self
    }

    /// Attach spoken audio.
    pub fn with_audio(mut self, clip: AudioBlob) -> Self {
        self.attached_audio = Some(clip);
        self
    }

    pub fn has_images(&self) -> bool {
        !self.attached_images.is_empty()
    }

    /// Check that some text is derivable: typed text or an audio clip.
    pub fn validate(&self) -> crate::Result<()> {
        let has_text = !self.query_text.trim().is_empty();
        let has_audio = self.attached_audio.as_ref().is_some_and(|a| !a.is_empty());
        if has_text || has_audio {
            Ok(())
        } else {
            Err(crate::Error::invalid_request(
                "query text is empty and no audio was attached",
            ))
        }
    }
}
