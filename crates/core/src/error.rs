//! Error types for Vox Agent.

use thiserror::Error;

use crate::types::InvocationMode;

/// Result type alias using Vox Agent's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Vox Agent.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Model Endpoint Errors
    // =========================================================================
    /// The endpoint could not be reached while checking its capabilities.
    #[error("Capability probe failed for {endpoint}: {message}")]
    Probe { endpoint: String, message: String },

    /// The endpoint rejected an image-bearing payload.
    #[error("Endpoint {endpoint} rejected image input: {detail}")]
    VisionUnsupported { endpoint: String, detail: String },

    #[error("Model invocation failed on {endpoint} ({mode}): {message}")]
    ModelInvocation {
        endpoint: String,
        mode: InvocationMode,
        message: String,
    },

    // =========================================================================
    // Optional Feature Errors
    // =========================================================================
    #[error("Feature unavailable: {feature}")]
    FeatureUnavailable { feature: String },

    #[error("Speech engine error: {0}")]
    Speech(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a probe error.
    pub fn probe(endpoint: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Probe {
            endpoint: endpoint.into(),
            message: msg.into(),
        }
    }

    /// Create a vision-unsupported error.
    pub fn vision_unsupported(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::VisionUnsupported {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }

    /// Create a model invocation error.
    pub fn model_invocation(
        endpoint: impl Into<String>,
        mode: InvocationMode,
        msg: impl Into<String>,
    ) -> Self {
        Self::ModelInvocation {
            endpoint: endpoint.into(),
            mode,
            message: msg.into(),
        }
    }

    /// Create a feature unavailable error.
    pub fn feature_unavailable(feature: impl Into<String>) -> Self {
        Self::FeatureUnavailable {
            feature: feature.into(),
        }
    }

    /// Create a speech engine error.
    pub fn speech(msg: impl Into<String>) -> Self {
        Self::Speech(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a gateway error.
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the request can still be answered after this error.
    ///
    /// Probe failures fall back to text-only and missing features degrade a
    /// single output. Everything else fails the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Probe { .. } | Self::FeatureUnavailable { .. })
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Probe { .. } => "PROBE_FAILED",
            Self::VisionUnsupported { .. } => "VISION_UNSUPPORTED",
            Self::ModelInvocation { .. } => "MODEL_INVOCATION_FAILED",
            Self::FeatureUnavailable { .. } => "FEATURE_UNAVAILABLE",
            Self::Speech(_) => "SPEECH_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}
