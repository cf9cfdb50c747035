#![deny(unused)]
//! Vox Agent - multimodal query routing for local model servers.
//!
//! Answers text, image and spoken queries against an OpenAI-compatible
//! endpoint, falling back to text-only when the model cannot see images and
//! to text output when speech synthesis is unavailable.

use std::sync::Arc;

use vox_core::config::AppConfig;
use vox_gateway::{AppState, FallbackOrchestrator, FeatureGate, GatewayConfig, GatewayServer};
use vox_model_gateway::CapabilityCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, load_error) = match AppConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialize tracing
    vox_governance::configure_tracing(&config.telemetry)?;
    if let Some(e) = load_error {
        tracing::warn!(error = %e, "Failed to load configuration; using defaults");
    }
    config.validate()?;

    tracing::info!("Starting Vox Agent v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Model endpoint & capability prober
    // =========================================================================
    let cache = Arc::new(CapabilityCache::new(config.llm.multimodal_probe_ttl()));
    let (model, prober) = vox_model_gateway::create_from_config(&config.llm, cache)?;
    let prober = Arc::new(prober);

    tracing::info!(
        base_url = %config.llm.base_url,
        model = %config.llm.model,
        strategy = ?config.llm.probe_strategy,
        force_text_only = config.llm.force_text_only,
        "Model endpoint configured"
    );

    // Warm the capability cache without delaying startup.
    let warm = prober.clone();
    tokio::spawn(async move {
        match warm.probe(false).await {
            Ok(profile) => tracing::info!(
                supports_multimodal = profile.supports_multimodal,
                source = ?profile.source,
                "Initial capability probe complete"
            ),
            Err(e) => tracing::warn!(error = %e, "Initial capability probe failed; will retry on first image query"),
        }
    });

    // =========================================================================
    // Optional features & orchestrator
    // =========================================================================
    let gate = Arc::new(FeatureGate::from_config(&config.speech));
    let orchestrator = Arc::new(
        FallbackOrchestrator::new(model, prober.clone(), gate.clone()).with_config(&config.orchestrator),
    );

    // =========================================================================
    // HTTP server
    // =========================================================================
    let metrics_handle = vox_governance::setup_metrics_recorder()?;
    let server = GatewayServer::new(
        GatewayConfig::from(&config.server),
        AppState {
            orchestrator,
            prober,
            gate,
        },
    )
    .with_metrics(metrics_handle);

    tracing::info!(host = %config.server.host, port = config.server.port, "Gateway ready");
    server.run().await?;

    Ok(())
}
