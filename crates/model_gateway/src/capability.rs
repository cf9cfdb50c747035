//! Capability probing for model endpoints.
//!
//! The [`CapabilityCache`] is shared state with a multi-reader,
//! single-writer-replace contract: a probe builds a complete
//! [`CapabilityProfile`] before inserting it, so readers never see a partial
//! entry and a cancelled probe leaves the previous entry in place.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

use vox_core::{
    config::{LlmConfig, ProbeStrategy},
    traits::ChatModel,
    types::{CapabilityProfile, ImageBlob, ModelInvocation, ProbeSource},
    Error, Result,
};

/// Per-endpoint cache of capability profiles.
pub struct CapabilityCache {
    entries: DashMap<String, CapabilityProfile>,
    ttl: Option<Duration>,
}

impl CapabilityCache {
    /// Create a cache. `ttl = None` keeps entries for the process lifetime.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// The entry for `endpoint` if it has not expired.
    pub fn get_fresh(&self, endpoint: &str) -> Option<CapabilityProfile> {
        let entry = self.entries.get(endpoint)?;
        let profile = entry.value();
        match self.ttl {
            None => Some(profile.clone()),
            Some(ttl) => {
                // A clock step backwards yields a negative age; keep the entry.
                let fresh = profile.age(Utc::now()).to_std().map_or(true, |age| age < ttl);
                fresh.then(|| profile.clone())
            }
        }
    }

    /// The entry for `endpoint` regardless of age.
    pub fn peek(&self, endpoint: &str) -> Option<CapabilityProfile> {
        self.entries.get(endpoint).map(|e| e.value().clone())
    }

    /// Replace the entry for the profile's endpoint.
    pub fn replace(&self, profile: CapabilityProfile) {
        self.entries.insert(profile.endpoint_identifier.clone(), profile);
    }

    pub fn invalidate(&self, endpoint: &str) {
        self.entries.remove(endpoint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CapabilityCache {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Determines whether the configured endpoint accepts image input.
pub struct CapabilityProber {
    model: Arc<dyn ChatModel>,
    cache: Arc<CapabilityCache>,
    strategy: ProbeStrategy,
    force_text_only: bool,
    vision_keywords: Vec<String>,
}

impl CapabilityProber {
    /// Create a prober with the default strategy and keyword list.
    pub fn new(model: Arc<dyn ChatModel>, cache: Arc<CapabilityCache>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            model,
            cache,
            strategy: defaults.probe_strategy,
            force_text_only: defaults.force_text_only,
            vision_keywords: defaults.vision_keywords,
        }
    }

    /// Create a prober configured from the `[llm]` section.
    pub fn from_config(model: Arc<dyn ChatModel>, cache: Arc<CapabilityCache>, config: &LlmConfig) -> Self {
        Self {
            model,
            cache,
            strategy: config.probe_strategy,
            force_text_only: config.force_text_only,
            vision_keywords: config.vision_keywords.clone(),
        }
    }

    pub fn with_strategy(mut self, strategy: ProbeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_force_text_only(mut self, force: bool) -> Self {
        self.force_text_only = force;
        self
    }

    pub fn endpoint_id(&self) -> String {
        self.model.endpoint_id()
    }

    /// Return the cached profile, probing when absent, stale, or `force`d.
    ///
    /// Fails with [`Error::Probe`] when the endpoint is unreachable; nothing
    /// is cached in that case.
    pub async fn probe(&self, force: bool) -> Result<CapabilityProfile> {
        let endpoint = self.model.endpoint_id();
        if !force {
            if let Some(profile) = self.cache.get_fresh(&endpoint) {
                return Ok(profile);
            }
        }

        let profile = self.detect(&endpoint).await?;
        tracing::info!(
            endpoint = %endpoint,
            model = %profile.model,
            supports_multimodal = profile.supports_multimodal,
            source = ?profile.source,
            "Capability profile updated"
        );
        self.cache.replace(profile.clone());
        Ok(profile)
    }

    /// Current cached profile without probing.
    pub fn cached(&self) -> Option<CapabilityProfile> {
        self.cache.peek(&self.model.endpoint_id())
    }

    /// Record that the endpoint rejected an image payload at runtime.
    pub fn mark_text_only(&self, reason: &str) -> CapabilityProfile {
        let endpoint = self.model.endpoint_id();
        tracing::warn!(
            endpoint = %endpoint,
            model = %self.model.model(),
            reason = %reason,
            "Endpoint rejected image input; caching as text-only"
        );
        let profile = CapabilityProfile::new(endpoint, self.model.model(), false, ProbeSource::Observed);
        self.cache.replace(profile.clone());
        profile
    }

    async fn detect(&self, endpoint: &str) -> Result<CapabilityProfile> {
        let model = self.model.model().to_string();

        if self.force_text_only {
            return Ok(CapabilityProfile::new(endpoint, model, false, ProbeSource::Forced));
        }

        let served = self.model.list_models().await?;
        if !served.is_empty() && !served.iter().any(|m| m == &model) {
            tracing::warn!(endpoint = %endpoint, model = %model, served = ?served, "Configured model not listed by endpoint");
        }

        match self.strategy {
            ProbeStrategy::Heuristic => {
                let vlm = looks_like_vlm(&model, &self.vision_keywords);
                Ok(CapabilityProfile::new(endpoint, model, vlm, ProbeSource::Heuristic))
            }
            ProbeStrategy::Active => {
                let vlm = self.active_check(endpoint).await?;
                Ok(CapabilityProfile::new(endpoint, model, vlm, ProbeSource::Active))
            }
        }
    }

    /// Send a one-pixel image with a one-token budget.
    async fn active_check(&self, endpoint: &str) -> Result<bool> {
        let invocation = ModelInvocation::multimodal("Reply with OK.", vec![probe_image()?]).with_max_tokens(1);

        match self.model.invoke(&invocation).await {
            Ok(_) => Ok(true),
            Err(Error::VisionUnsupported { detail, .. }) => {
                tracing::debug!(endpoint = %endpoint, detail = %detail, "Active probe: images rejected");
                Ok(false)
            }
            Err(e) => Err(Error::probe(endpoint, format!("active probe failed: {}", e))),
        }
    }
}

/// Whether a model name belongs to a known vision-language family.
///
/// Matches any configured keyword as a substring, or a standalone `vl` token:
/// `qwen2.5-vl-7b` matches, `internvl2` does not.
pub fn looks_like_vlm(model: &str, keywords: &[String]) -> bool {
    let lowered = model.to_lowercase();
    if lowered.is_empty() {
        return false;
    }
    if keywords.iter().any(|k| !k.is_empty() && lowered.contains(&k.to_lowercase())) {
        return true;
    }
    lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| token == "vl")
}

fn probe_image() -> Result<ImageBlob> {
    let pixel = image::DynamicImage::ImageRgb8(image::RgbImage::new(1, 1));
    let mut out = Cursor::new(Vec::new());
    pixel
        .write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| Error::internal(format!("Failed to encode probe image: {}", e)))?;
    Ok(ImageBlob::new(out.into_inner()).with_mime_type("image/png"))
}
