#![deny(unused)]
//! Observability for Vox Agent.
//!
//! This crate provides:
//! - Tracing subscriber setup (plain or JSON logs, optional OTLP export)
//! - Prometheus metrics for routing and fallback decisions

pub mod metrics;
pub mod tracing_layer;

pub use metrics::{
    setup_metrics_recorder, track_feature_unavailable, track_probe, track_query, track_vision_fallback,
};
pub use tracing_layer::configure_tracing;
