#![deny(unused)]
//! HTTP entry point and request orchestration for Vox Agent.
//!
//! This crate wires the capability prober, the optional speech engines and
//! image intake into a single query pipeline served over HTTP.

pub mod audio;
pub mod features;
pub mod orchestrator;
pub mod server;
pub mod vision;

pub use audio::{AudioFormat, PiperSynthesizer, WhisperCliTranscriber};
pub use features::FeatureGate;
pub use orchestrator::FallbackOrchestrator;
pub use server::{AppState, GatewayConfig, GatewayServer};
pub use vision::{ImageInfo, ImageIntake, IntakeOutcome};
