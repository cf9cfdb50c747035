use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

use vox_core::config::ProbeStrategy;
use vox_core::mocks::{MockChatModel, MockSynthesizer, MockTranscriber};
use vox_gateway::{AppState, FallbackOrchestrator, FeatureGate, GatewayConfig, GatewayServer};
use vox_model_gateway::{CapabilityCache, CapabilityProber};

fn app(llm: Arc<MockChatModel>, gate: FeatureGate) -> Router {
    let prober = Arc::new(
        CapabilityProber::new(llm.clone(), Arc::new(CapabilityCache::default()))
            .with_strategy(ProbeStrategy::Heuristic),
    );
    let gate = Arc::new(gate);
    let orchestrator = Arc::new(FallbackOrchestrator::new(llm, prober.clone(), gate.clone()));
    GatewayServer::new(
        GatewayConfig::default(),
        AppState {
            orchestrator,
            prober,
            gate,
        },
    )
    .build_router()
}

fn png_base64() -> String {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(2, 2));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    STANDARD.encode(out.into_inner())
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
    let (status, body) = send_json(app(llm, FeatureGate::disabled()), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tts_available"], false);
    assert_eq!(body["stt_available"], false);
}

#[tokio::test]
async fn test_query_with_image_on_vlm() {
    let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
    let (status, body) = send_json(
        app(llm.clone(), FeatureGate::disabled()),
        "POST",
        "/v1/query",
        Some(json!({ "query": "What is this?", "images": [png_base64()] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "MULTIMODAL");
    assert_eq!(body["degraded"], false);
    assert_eq!(body["answer_text"], "answer: What is this?");
    assert!(body["trace_id"].as_str().is_some());
    assert_eq!(llm.calls()[0].image_count, 1);
}

#[tokio::test]
async fn test_query_falls_back_when_images_rejected() {
    let llm = Arc::new(MockChatModel::text_only("llava-v1.6-mistral-7b"));
    let (status, body) = send_json(
        app(llm.clone(), FeatureGate::disabled()),
        "POST",
        "/v1/query",
        Some(json!({ "query": "What is this?", "images": [png_base64()] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "TEXT_ONLY");
    assert_eq!(body["degraded"], true);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn test_query_speaks_when_tts_available() {
    let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
    let gate = FeatureGate::new(Some(Arc::new(MockSynthesizer::new())), None);
    let (status, body) = send_json(
        app(llm, gate),
        "POST",
        "/v1/query",
        Some(json!({ "query": "hello", "speak": true })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let audio = STANDARD.decode(body["audio"].as_str().unwrap()).unwrap();
    assert!(audio.starts_with(b"RIFF"));
}

#[tokio::test]
async fn test_query_without_tts_still_answers() {
    let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
    let (status, body) = send_json(
        app(llm, FeatureGate::disabled()),
        "POST",
        "/v1/query",
        Some(json!({ "query": "hello", "speak": true })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer_text"], "answer: hello");
    assert!(body["audio"].is_null());
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
    let (status, body) = send_json(
        app(llm, FeatureGate::disabled()),
        "POST",
        "/v1/query",
        Some(json!({ "query": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(body["trace_id"].as_str().is_some());
}

#[tokio::test]
async fn test_invalid_base64_image_is_bad_request() {
    let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
    let (status, _) = send_json(
        app(llm.clone(), FeatureGate::disabled()),
        "POST",
        "/v1/query",
        Some(json!({ "query": "hi", "images": ["%%%"] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_model_failure_is_bad_gateway() {
    let llm = Arc::new(
        MockChatModel::vision("qwen/qwen3-vl-4b")
            .with_script(vec![vox_core::mocks::MockReply::Fail("HTTP 500".into())]),
    );
    let (status, body) = send_json(
        app(llm, FeatureGate::disabled()),
        "POST",
        "/v1/query",
        Some(json!({ "query": "hi" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "MODEL_INVOCATION_FAILED");
}

#[tokio::test]
async fn test_transcribe_endpoint() {
    let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));
    let audio = STANDARD.encode(b"RIFF....WAVE");

    let (status, _) = send_json(
        app(llm.clone(), FeatureGate::disabled()),
        "POST",
        "/v1/transcribe",
        Some(json!({ "audio": audio })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let gate = FeatureGate::new(None, Some(Arc::new(MockTranscriber::new("turn on the lights"))));
    let (status, body) = send_json(
        app(llm, gate),
        "POST",
        "/v1/transcribe",
        Some(json!({ "audio": audio })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "turn on the lights");
}

#[tokio::test]
async fn test_tts_endpoint() {
    let llm = Arc::new(MockChatModel::vision("qwen/qwen3-vl-4b"));

    let (status, body) = send_json(
        app(llm.clone(), FeatureGate::disabled()),
        "POST",
        "/v1/tts",
        Some(json!({ "text": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "FEATURE_UNAVAILABLE");

    let gate = FeatureGate::new(Some(Arc::new(MockSynthesizer::new())), None);
    let (status, bytes) = send(app(llm, gate), "POST", "/v1/tts", Some(json!({ "text": "hello" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bytes.starts_with(b"RIFF"));
}

#[tokio::test]
async fn test_capabilities_endpoint() {
    let llm = Arc::new(MockChatModel::text_only("liquid/lfm2-1.2b"));
    let (status, body) = send_json(
        app(llm.clone(), FeatureGate::disabled()),
        "GET",
        "/v1/capabilities",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["supports_multimodal"], false);
    assert_eq!(body["source"], "heuristic");
    assert_eq!(body["model"], "liquid/lfm2-1.2b");

    llm.set_reachable(false);
    let (status, body) = send_json(
        app(llm, FeatureGate::disabled()),
        "GET",
        "/v1/capabilities?refresh=true",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "PROBE_FAILED");
}
