//! Integration tests for OllamaClient against stub servers

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use gateway::{GatewayConfig, GatewayError, OllamaClient};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::net::TcpListener;

/// Helper to serve `app` on an ephemeral port and return its base URL
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: String) -> OllamaClient {
    OllamaClient::new(GatewayConfig {
        base_url,
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

/// Stub that echoes the request back inside `response`
fn ollama_stub() -> Router {
    Router::new()
        .route(
            "/api/tags",
            get(|| async {
                Json(json!({
                    "models": [
                        {"name": "llama3:latest", "size": 1},
                        {"name": "mistral:7b", "size": 2}
                    ]
                }))
            }),
        )
        .route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                let reply = format!(
                    "{}|{}|{}",
                    body["model"].as_str().unwrap_or_default(),
                    body["prompt"].as_str().unwrap_or_default(),
                    body["stream"]
                );
                Json(json!({ "model": body["model"], "response": reply, "done": true }))
            }),
        )
}

#[tokio::test]
async fn test_list_models() {
    let client = client(serve(ollama_stub()).await);

    let models = client.list_models().await.unwrap();
    assert_eq!(models, vec!["llama3:latest", "mistral:7b"]);
    assert_eq!(client.available_models(), models);
}

#[tokio::test]
async fn test_generate_with_selected_model() {
    let client = client(serve(ollama_stub()).await);
    client.select_model("llama3:latest");

    let reply = client.generate("hello", None).await.unwrap();
    assert_eq!(reply, "llama3:latest|hello|false");
}

#[tokio::test]
async fn test_generate_override_does_not_change_selection() {
    let client = client(serve(ollama_stub()).await);
    client.select_model("llama3:latest");

    let reply = client.generate("hi", Some("mistral:7b")).await.unwrap();
    assert_eq!(reply, "mistral:7b|hi|false");
    assert_eq!(client.current_model().as_deref(), Some("llama3:latest"));
}

#[tokio::test]
async fn test_non_success_status() {
    let app = Router::new()
        .route("/api/tags", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/api/generate", post(|| async { StatusCode::NOT_FOUND }));
    let client = client(serve(app).await);

    assert_eq!(client.list_models().await.unwrap_err(), GatewayError::Status(500));
    assert_eq!(
        client.generate("hi", Some("missing")).await.unwrap_err(),
        GatewayError::Status(404)
    );
}

#[tokio::test]
async fn test_unexpected_body() {
    let app = Router::new().route("/api/tags", get(|| async { Json(json!({"tags": []})) }));
    let client = client(serve(app).await);

    let err = client.list_models().await.unwrap_err();
    assert!(matches!(err, GatewayError::Decode(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(format!("http://{}", addr));
    let err = client.list_models().await.unwrap_err();
    assert!(matches!(err, GatewayError::Connection(_)), "got {:?}", err);
    // Failed fetch keeps the previous (empty) cache
    assert!(client.available_models().is_empty());
}
