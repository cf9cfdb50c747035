//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use vox_core::{types::InvocationMode, Error, Result};

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::config(format!("Failed to install Prometheus recorder: {}", e)))?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Count an answered query by final mode and degradation.
pub fn track_query(mode: InvocationMode, degraded: bool) {
    metrics::counter!(
        "vox_queries_total",
        "mode" => mode.as_str(),
        "degraded" => if degraded { "true" } else { "false" }
    )
    .increment(1);
}

/// Count a multimodal call retried as text-only.
pub fn track_vision_fallback(endpoint: &str) {
    metrics::counter!("vox_vision_fallback_total", "endpoint" => endpoint.to_string()).increment(1);
}

/// Count a skipped optional feature (`tts` or `stt`).
pub fn track_feature_unavailable(feature: &'static str) {
    metrics::counter!("vox_feature_unavailable_total", "feature" => feature).increment(1);
}

/// Count a capability probe by outcome (`multimodal`, `text_only`, `error`).
pub fn track_probe(endpoint: &str, outcome: &'static str) {
    metrics::counter!(
        "vox_capability_probes_total",
        "endpoint" => endpoint.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}
