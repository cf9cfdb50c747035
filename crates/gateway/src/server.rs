//! Axum-based HTTP server for the gateway.

use axum::{
    extract::{DefaultBodyLimit, Json, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use metrics_exporter_prometheus::PrometheusHandle;
use vox_core::{
    config::ServerConfig,
    types::{AudioBlob, CapabilityProfile, ImageBlob, InvocationMode, Request},
    Error, Result,
};
use vox_model_gateway::CapabilityProber;

use crate::features::FeatureGate;
use crate::orchestrator::FallbackOrchestrator;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Origins allowed by CORS. `*` allows any.
    pub allowed_origins: Vec<String>,
    /// Request body limit, sized for base64 images and audio.
    pub max_body_bytes: usize,
    /// Enable request tracing.
    pub enable_tracing: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            allowed_origins: config.allowed_origins.clone(),
            max_body_bytes: config.max_body_bytes,
            enable_tracing: true,
        }
    }
}

/// Shared application state.
pub struct AppState {
    pub orchestrator: Arc<FallbackOrchestrator>,
    pub prober: Arc<CapabilityProber>,
    pub gate: Arc<FeatureGate>,
}

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/v1/query", post(query_handler))
            .route("/v1/transcribe", post(transcribe_handler))
            .route("/v1/tts", post(tts_handler))
            .route("/v1/capabilities", get(capabilities_handler))
            .with_state(self.state.clone());

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        router = router
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(cors_layer(&self.config.allowed_origins));

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::gateway(format!("Failed to bind: {}", e)))?;

        tracing::info!(addr = %addr, "Gateway server starting");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::gateway(format!("Server error: {}", e)))?;

        Ok(())
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query request. Images and audio are base64, with or without a data-URL prefix.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub query: String,
    pub images: Vec<String>,
    pub audio: Option<String>,
    /// Return spoken audio along with the text answer.
    pub speak: bool,
}

/// Query response.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Trace ID for this request.
    pub trace_id: String,
    pub answer_text: String,
    /// Base64 WAV, when speech was requested and available.
    pub audio: Option<String>,
    /// True if supplied images were not shown to the model.
    pub degraded: bool,
    pub mode: InvocationMode,
    pub transcript: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscribeRequest {
    pub audio: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub trace_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CapabilitiesParams {
    /// Re-probe instead of returning the cached profile.
    pub refresh: bool,
}

/// Health response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    pub tts_available: bool,
    pub stt_available: bool,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Trace ID.
    pub trace_id: Option<String>,
}

/// An [`Error`] tagged with the request's trace ID.
pub struct ApiError {
    error: Error,
    trace_id: String,
}

impl ApiError {
    fn new(error: Error, trace_id: &str) -> Self {
        Self {
            error,
            trace_id: trace_id.to_string(),
        }
    }
}

/// HTTP status for an error surfaced to a client.
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::FeatureUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::ModelInvocation { .. } | Error::Probe { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        if status.is_server_error() {
            tracing::error!(trace_id = %self.trace_id, code = self.error.code(), error = %self.error, "Request failed");
        } else {
            tracing::warn!(trace_id = %self.trace_id, code = self.error.code(), error = %self.error, "Request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                code: self.error.code().to_string(),
                message: self.error.to_string(),
                trace_id: Some(self.trace_id),
            }),
        )
            .into_response()
    }
}

/// Decode base64, accepting an optional `data:<mime>;base64,` prefix.
fn decode_base64(field: &str, value: &str) -> Result<Vec<u8>> {
    let payload = match value.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
        None => value,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::invalid_request(format!("{} is not valid base64: {}", field, e)))
}

fn into_request(payload: QueryRequest) -> Result<(Request, bool)> {
    let mut request = Request::text(payload.query);
    for (i, image) in payload.images.iter().enumerate() {
        request = request.with_image(ImageBlob::new(decode_base64(&format!("images[{}]", i), image)?));
    }
    if let Some(audio) = payload.audio.as_deref().filter(|a| !a.trim().is_empty()) {
        request = request.with_audio(AudioBlob::new(decode_base64("audio", audio)?));
    }
    Ok((request, payload.speak))
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tts_available: state.gate.tts_available(),
        stt_available: state.gate.stt_available(),
    })
}

/// Query handler.
async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> std::result::Result<Json<QueryResponse>, ApiError> {
    let trace_id = Uuid::new_v4().to_string();

    tracing::info!(
        trace_id = %trace_id,
        query_len = payload.query.len(),
        images = payload.images.len(),
        audio = payload.audio.is_some(),
        speak = payload.speak,
        "Processing query"
    );

    let (request, speak) = into_request(payload).map_err(|e| ApiError::new(e, &trace_id))?;
    let response = state
        .orchestrator
        .handle(request, speak)
        .await
        .map_err(|e| ApiError::new(e, &trace_id))?;

    Ok(Json(QueryResponse {
        trace_id,
        answer_text: response.answer_text,
        audio: response.audio.map(|a| STANDARD.encode(&a.data)),
        degraded: response.degraded,
        mode: response.mode,
        transcript: response.transcript,
    }))
}

/// Standalone speech-to-text.
async fn transcribe_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TranscribeRequest>,
) -> std::result::Result<Json<TranscribeResponse>, ApiError> {
    let trace_id = Uuid::new_v4().to_string();
    let audio = decode_base64("audio", &payload.audio).map_err(|e| ApiError::new(e, &trace_id))?;

    let text = state
        .gate
        .transcribe(&AudioBlob::new(audio))
        .await
        .map_err(|e| ApiError::new(e, &trace_id))?;

    tracing::info!(trace_id = %trace_id, chars = text.len(), "Transcription complete");
    Ok(Json(TranscribeResponse { trace_id, text }))
}

/// Standalone text-to-speech, returning a WAV body.
async fn tts_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TtsRequest>,
) -> std::result::Result<Response, ApiError> {
    let trace_id = Uuid::new_v4().to_string();
    if payload.text.trim().is_empty() {
        return Err(ApiError::new(Error::invalid_request("text must not be empty"), &trace_id));
    }

    let audio = state
        .gate
        .synthesize(&payload.text)
        .await
        .map_err(|e| ApiError::new(e, &trace_id))?;

    let mime = audio.mime_type.unwrap_or_else(|| "audio/wav".to_string());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"speech.wav\"".to_string()),
        ],
        audio.data,
    )
        .into_response())
}

/// Current capability profile of the configured endpoint.
async fn capabilities_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CapabilitiesParams>,
) -> std::result::Result<Json<CapabilityProfile>, ApiError> {
    let trace_id = Uuid::new_v4().to_string();
    let profile = state
        .prober
        .probe(params.refresh)
        .await
        .map_err(|e| ApiError::new(e, &trace_id))?;
    Ok(Json(profile))
}
