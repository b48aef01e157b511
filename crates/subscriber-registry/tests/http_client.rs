//! HTTP client tests against a local axum registry

use axum::{
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use subscriber_registry::{
    HttpRegistryClient, RegistryClient, RegistryClientConfig, RegistryError, SubscribeRequest,
};
use tokio::net::TcpListener;

async fn spawn_registry(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn request() -> SubscribeRequest {
    SubscribeRequest {
        subscriber_id: "acme.org".into(),
        key_id: "k1".into(),
        subscriber_type: "BPP".into(),
        url: "https://acme.org/beckn".into(),
        domain: "retail".into(),
        location: None,
        signing_public_key: "sig".into(),
        encr_public_key: "enc".into(),
        valid_from: None,
        valid_until: None,
        message_id: "m-1".into(),
    }
}

fn client(base_url: String) -> HttpRegistryClient {
    let mut config = RegistryClientConfig::new(base_url);
    config.timeout = Duration::from_millis(500);
    HttpRegistryClient::new(config).unwrap()
}

#[tokio::test]
async fn test_subscribe_acknowledged() {
    let router = Router::new().route(
        "/subscribe",
        post(|Json(body): Json<Value>| async move {
            Json(json!({"status": "UNDER_SUBSCRIPTION", "message_id": body["message_id"]}))
        }),
    );
    let base = spawn_registry(router).await;

    let ack = client(base).subscribe(&request()).await.unwrap();
    assert_eq!(ack.status, "UNDER_SUBSCRIPTION");
    assert_eq!(ack.message_id, "m-1");
}

#[tokio::test]
async fn test_update_sends_authorization() {
    let router = Router::new().route(
        "/subscribe",
        axum::routing::patch(|headers: HeaderMap| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            Json(json!({"status": auth, "message_id": "m-1"}))
        }),
    );
    let base = spawn_registry(router).await;

    let ack = client(base)
        .update_subscription(&request(), "Signature keyId=\"acme.org|k1|ed25519\"")
        .await
        .unwrap();
    assert_eq!(ack.status, "Signature keyId=\"acme.org|k1|ed25519\"");
}

#[tokio::test]
async fn test_client_error_is_rejection() {
    let router = Router::new().route(
        "/subscribe",
        post(|| async {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": {"code": "INVALID_DOMAIN", "message": "unknown domain"}})),
            )
        }),
    );
    let base = spawn_registry(router).await;

    let err = client(base).subscribe(&request()).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(
        err,
        RegistryError::Rejected {
            status: 400,
            code: "INVALID_DOMAIN".into(),
            message: "unknown domain".into(),
        }
    );
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let router = Router::new().route(
        "/subscribe",
        post(|| async { StatusCode::SERVICE_UNAVAILABLE }),
    );
    let base = spawn_registry(router).await;

    let err = client(base).subscribe(&request()).await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable(_)));
}

#[tokio::test]
async fn test_garbage_body_is_invalid_response() {
    let router = Router::new().route("/subscribe", post(|| async { "not json" }));
    let base = spawn_registry(router).await;

    let err = client(base).subscribe(&request()).await.unwrap_err();
    assert!(matches!(err, RegistryError::InvalidResponse(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_timeout_is_unavailable() {
    let router = Router::new().route(
        "/subscribe",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "late"
        }),
    );
    let base = spawn_registry(router).await;

    let err = client(base).subscribe(&request()).await.unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable(_)));
}

#[tokio::test]
async fn test_unreachable_registry_is_unavailable() {
    // Bind then drop to get a port with nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(format!("http://{}", addr))
        .subscribe(&request())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Unavailable(_)));
}
