use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub speech: SpeechConfig,
    pub orchestrator: OrchestratorConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            allowed_origins: vec!["*".into()],
            max_body_bytes: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// How the prober decides whether an endpoint accepts images.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStrategy {
    /// Match the model name against known vision-language families.
    Heuristic,
    /// Send a one-pixel image and see whether the endpoint accepts it.
    #[default]
    Active,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL, e.g. LM Studio's `http://localhost:1234/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key: Option<Secret<String>>,
    /// Never send images, regardless of what the endpoint supports.
    pub force_text_only: bool,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// How long a probe result stays valid. 0 keeps it for the process lifetime.
    pub multimodal_probe_ttl_secs: u64,
    pub probe_strategy: ProbeStrategy,
    /// Model name fragments that identify a vision-language model.
    pub vision_keywords: Vec<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".into(),
            model: "liquid/lfm2-1.2b".into(),
            api_key: None,
            force_text_only: false,
            request_timeout_secs: 200,
            temperature: 0.7,
            max_tokens: 250,
            multimodal_probe_ttl_secs: 0,
            probe_strategy: ProbeStrategy::default(),
            vision_keywords: vec![
                "qwen2-vl".into(),
                "qwen3-vl".into(),
                "llava".into(),
                "minicpm".into(),
                "pixtral".into(),
                "vision".into(),
            ],
        }
    }
}

impl LlmConfig {
    /// Probe TTL, `None` when results never expire.
    pub fn multimodal_probe_ttl(&self) -> Option<Duration> {
        match self.multimodal_probe_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SpeechConfig {
    pub tts_enabled: bool,
    pub stt_enabled: bool,
    /// Scratch space for engine input/output files.
    pub temp_dir: PathBuf,

    // Piper TTS
    pub piper_binary: String,
    pub piper_model_path: Option<String>,
    pub piper_config_path: Option<String>,
    pub piper_speaker_id: Option<String>,
    pub tts_timeout_secs: u64,

    // whisper.cpp STT
    pub whisper_binary: String,
    pub whisper_model_path: Option<String>,
    /// Empty or unset means auto-detect.
    pub stt_language: Option<String>,
    pub stt_timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            stt_enabled: true,
            temp_dir: std::env::temp_dir().join("vox-agent"),
            piper_binary: "piper".into(),
            piper_model_path: None,
            piper_config_path: None,
            piper_speaker_id: None,
            tts_timeout_secs: 300,
            whisper_binary: "whisper-cli".into(),
            whisper_model_path: None,
            stt_language: None,
            stt_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum number of images forwarded to the model per request.
    pub max_images: usize,
    /// Maximum number of retrieved context passages per request.
    pub context_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_images: 2,
            context_limit: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub service_name: String,
    /// Overrides `RUST_LOG` when set.
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            json_logs: false,
            service_name: "vox-agent".into(),
            log_filter: None,
        }
    }
}

/// Treat a missing or blank setting as unset.
pub fn setting(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("VOX_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__LLM__MODEL=qwen/qwen3-vl-4b to llm.model
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.llm.base_url.trim().is_empty() {
            return Err(crate::Error::config("llm.base_url must not be empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(crate::Error::config("llm.model must not be empty"));
        }
        if self.orchestrator.max_images == 0 {
            return Err(crate::Error::config("orchestrator.max_images must be at least 1"));
        }
        Ok(())
    }
}
