use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a capability answer was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeSource {
    /// Text-only forced by configuration; no network call was made.
    Forced,
    /// Inferred from the model name.
    Heuristic,
    /// Established by sending a tiny image-bearing request.
    Active,
    /// Learned from a rejected multimodal call at runtime.
    Observed,
}

/// Whether an endpoint accepts image input, and when we learned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// Endpoint identity (base URL plus model).
    pub endpoint_identifier: String,
    /// Model name configured for the endpoint.
    pub model: String,
    /// Whether image-bearing payloads are accepted.
    pub supports_multimodal: bool,
    /// How the answer was obtained.
    pub source: ProbeSource,
    /// When the profile was created.
    pub probed_at: DateTime<Utc>,
}

impl CapabilityProfile {
    pub fn new(
        endpoint_identifier: impl Into<String>,
        model: impl Into<String>,
        supports_multimodal: bool,
        source: ProbeSource,
    ) -> Self {
        Self {
            endpoint_identifier: endpoint_identifier.into(),
            model: model.into(),
            supports_multimodal,
            source,
            probed_at: Utc::now(),
        }
    }

    /// Age of the profile relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.probed_at
    }
}
