//! End-to-end: HTTP surface, orchestrator and the real endpoint client
//! against an in-process fake model server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use vox_core::config::{LlmConfig, ProbeStrategy};
use vox_gateway::{AppState, FallbackOrchestrator, FeatureGate, GatewayConfig, GatewayServer};
use vox_model_gateway::{create_from_config, CapabilityCache};

/// 1x1 transparent PNG.
const PIXEL_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

/// Fake OpenAI-compatible server that rejects image parts unless `vision`.
async fn spawn_model_server(vision: bool, completions: Arc<AtomicUsize>) -> String {
    let app = Router::new()
        .route(
            "/v1/models",
            get(|| async { Json(json!({"data": [{"id": "llava-local"}]})) }),
        )
        .route(
            "/v1/chat/completions",
            post(move |Json(body): Json<Value>| {
                let completions = completions.clone();
                async move {
                    completions.fetch_add(1, Ordering::SeqCst);
                    let has_parts = body["messages"]
                        .as_array()
                        .map(|msgs| msgs.iter().any(|m| m["content"].is_array()))
                        .unwrap_or(false);
                    if has_parts && !vision {
                        return (
                            StatusCode::BAD_REQUEST,
                            Json(json!({"error": "Vision input is not supported by this model"})),
                        );
                    }
                    let reply = if has_parts { "A single pixel." } else { "I cannot see images." };
                    (
                        StatusCode::OK,
                        Json(json!({
                            "choices": [{"message": {"role": "assistant", "content": reply}, "finish_reason": "stop"}],
                            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
                        })),
                    )
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

fn build_app(base_url: String) -> Router {
    let config = LlmConfig {
        base_url,
        model: "llava-local".into(),
        request_timeout_secs: 5,
        probe_strategy: ProbeStrategy::Heuristic,
        ..Default::default()
    };
    let (model, prober) = create_from_config(&config, Arc::new(CapabilityCache::default())).unwrap();
    let prober = Arc::new(prober);
    let gate = Arc::new(FeatureGate::disabled());
    let orchestrator = Arc::new(FallbackOrchestrator::new(model, prober.clone(), gate.clone()));

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

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_image_query_on_vision_endpoint() {
    let completions = Arc::new(AtomicUsize::new(0));
    let app = build_app(spawn_model_server(true, completions.clone()).await);

    let (status, body) = call(
        &app,
        "POST",
        "/v1/query",
        Some(json!({ "query": "What is this?", "images": [PIXEL_PNG] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer_text"], "A single pixel.");
    assert_eq!(body["mode"], "MULTIMODAL");
    assert_eq!(body["degraded"], false);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_images_fall_back_and_are_remembered() {
    let completions = Arc::new(AtomicUsize::new(0));
    let app = build_app(spawn_model_server(false, completions.clone()).await);

    // The name suggests a VLM, so the first attempt carries the image.
    let (status, body) = call(
        &app,
        "POST",
        "/v1/query",
        Some(json!({ "query": "What is this?", "images": [PIXEL_PNG] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer_text"], "I cannot see images.");
    assert_eq!(body["mode"], "TEXT_ONLY");
    assert_eq!(body["degraded"], true);
    assert_eq!(completions.load(Ordering::SeqCst), 2);

    let (status, profile) = call(&app, "GET", "/v1/capabilities", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["supports_multimodal"], false);
    assert_eq!(profile["source"], "observed");

    // The next image query goes straight to text-only.
    let (status, body) = call(
        &app,
        "POST",
        "/v1/query",
        Some(json!({ "query": "And this?", "images": [PIXEL_PNG] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], true);
    assert_eq!(completions.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_text_query_needs_no_probe() {
    let completions = Arc::new(AtomicUsize::new(0));
    let app = build_app(spawn_model_server(false, completions.clone()).await);

    let (status, body) = call(&app, "POST", "/v1/query", Some(json!({ "query": "Hello" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "TEXT_ONLY");
    assert_eq!(body["degraded"], false);
    assert_eq!(completions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_bad_gateway() {
    let app = build_app("http://127.0.0.1:9/v1".to_string());

    let (status, body) = call(&app, "POST", "/v1/query", Some(json!({ "query": "Hello" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "MODEL_INVOCATION_FAILED");
}
