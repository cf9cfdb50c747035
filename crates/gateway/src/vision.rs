//! Image intake for multimodal queries.
//!
//! Attachments are checked before they reach the model: undecodable blobs
//! are dropped, and only the first `max_images` usable images are kept.

use std::io::Cursor;

use vox_core::{types::ImageBlob, Error, Result};

/// Information about an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// MIME type derived from the detected format.
    pub mime_type: &'static str,
    /// Size in bytes.
    pub size_bytes: usize,
}

/// Read format and dimensions from the image header.
pub fn inspect(image_data: &[u8]) -> Result<ImageInfo> {
    let reader = image::ImageReader::new(Cursor::new(image_data))
        .with_guessed_format()
        .map_err(|e| Error::invalid_request(format!("Invalid image: {}", e)))?;

    let format = reader
        .format()
        .ok_or_else(|| Error::invalid_request("Invalid image: unknown format"))?;

    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| Error::invalid_request(format!("Invalid image: {}", e)))?;

    Ok(ImageInfo {
        width,
        height,
        mime_type: format.to_mime_type(),
        size_bytes: image_data.len(),
    })
}

/// Result of admitting a batch of attachments.
#[derive(Debug, Default)]
pub struct IntakeOutcome {
    /// Usable images, in the order attached, with MIME types filled in.
    pub accepted: Vec<ImageBlob>,
    /// Images that could not be decoded.
    pub rejected: usize,
    /// Usable images dropped by the per-request limit.
    pub truncated: usize,
}

impl IntakeOutcome {
    pub fn has_images(&self) -> bool {
        !self.accepted.is_empty()
    }
}

/// Filters and caps image attachments.
#[derive(Debug, Clone)]
pub struct ImageIntake {
    max_images: usize,
}

impl ImageIntake {
    pub fn new(max_images: usize) -> Self {
        Self {
            max_images: max_images.max(1),
        }
    }

    pub fn max_images(&self) -> usize {
        self.max_images
    }

    pub fn admit(&self, images: Vec<ImageBlob>) -> IntakeOutcome {
        let mut outcome = IntakeOutcome::default();

        for (index, image) in images.into_iter().enumerate() {
            match inspect(&image.data) {
                Ok(info) => {
                    if outcome.accepted.len() >= self.max_images {
                        outcome.truncated += 1;
                        continue;
                    }
                    tracing::debug!(
                        index,
                        width = info.width,
                        height = info.height,
                        mime = info.mime_type,
                        bytes = info.size_bytes,
                        "Image accepted"
                    );
                    outcome.accepted.push(ImageBlob {
                        data: image.data,
                        mime_type: Some(info.mime_type.to_string()),
                    });
                }
                Err(e) => {
                    tracing::warn!(index, bytes = image.data.len(), error = %e, "Dropping unreadable image");
                    outcome.rejected += 1;
                }
            }
        }

        if outcome.truncated > 0 {
            tracing::warn!(
                limit = self.max_images,
                dropped = outcome.truncated,
                "Image limit reached; extra images dropped"
            );
        }

        outcome
    }
}

impl Default for ImageIntake {
    fn default() -> Self {
        Self::new(2)
    }
}
