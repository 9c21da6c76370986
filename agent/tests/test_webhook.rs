//! Webhook gateway integration tests

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use pushdeploy::deploy::deployer::Deployer;
use pushdeploy::process::supervisor::ProcessSupervisor;
use pushdeploy::server::serve::router;
use pushdeploy::server::signature::compute_signature;
use pushdeploy::server::state::{GatewayOptions, ServerState};
use pushdeploy::update::engine::SelfUpdateEngine;

const BODY: &str = r#"{"ref":"refs/heads/main","repository":{"name":"x","clone_url":"U"},"head_commit":{"id":"c","message":"m"}}"#;

fn make_state(gateway: GatewayOptions) -> Arc<ServerState> {
    let supervisor = Arc::new(ProcessSupervisor::new());
    let scratch = std::env::temp_dir().join("pushdeploy-test-scratch");
    let target = std::env::temp_dir().join("pushdeploy-test-target");
    let binary = std::env::temp_dir().join("pushdeploy-test-binary");
    let deployer = Arc::new(Deployer::new(supervisor.clone(), target));
    let updater = Arc::new(SelfUpdateEngine::with_paths(binary, scratch));
    Arc::new(ServerState::new(supervisor, deployer, updater, gateway))
}

fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("x-hub-signature-256", sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn allowed(branches: &[&str]) -> Vec<String> {
    branches.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_valid_signature_routes_to_deployer() {
    let state = make_state(GatewayOptions {
        webhook_secret: Some("s".to_string()),
        allowed_branches: allowed(&["main"]),
        self_update_url: "V".to_string(),
        target_url: "U".to_string(),
    });
    let app = router(state);

    let sig = compute_signature("s", BODY.as_bytes());
    let response = app.oneshot(webhook_request(BODY, Some(&sig))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("deployment dispatched"), "body: {}", body);
}

#[tokio::test]
async fn test_self_update_url_routes_to_updater() {
    let state = make_state(GatewayOptions {
        webhook_secret: None,
        allowed_branches: vec![],
        self_update_url: "U".to_string(),
        target_url: "T".to_string(),
    });
    let app = router(state);

    let response = app.oneshot(webhook_request(BODY, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("self-update dispatched"), "body: {}", body);
}

#[tokio::test]
async fn test_filtered_branch_is_acknowledged_not_dispatched() {
    let state = make_state(GatewayOptions {
        webhook_secret: Some("s".to_string()),
        allowed_branches: allowed(&["main"]),
        self_update_url: "V".to_string(),
        target_url: "U".to_string(),
    });
    let app = router(state);

    let body = BODY.replace("refs/heads/main", "refs/heads/staging");
    let sig = compute_signature("s", body.as_bytes());
    let response = app.oneshot(webhook_request(&body, Some(&sig))).await.unwrap();

    // Filtered is a successful no-op: 2xx so the sender does not redeliver
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_string(response).await;
    assert!(text.contains("not configured for deployment"), "body: {}", text);
    assert!(text.contains("staging"), "body: {}", text);
}

#[tokio::test]
async fn test_unknown_repository_is_acknowledged() {
    let state = make_state(GatewayOptions {
        webhook_secret: None,
        allowed_branches: vec![],
        self_update_url: "V".to_string(),
        target_url: "T".to_string(),
    });
    let app = router(state);

    let response = app.oneshot(webhook_request(BODY, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let text = body_string(response).await;
    assert!(text.contains("not configured"), "body: {}", text);
}

#[tokio::test]
async fn test_missing_signature_rejected_when_secret_configured() {
    let state = make_state(GatewayOptions {
        webhook_secret: Some("s".to_string()),
        ..Default::default()
    });
    let app = router(state);

    let response = app.oneshot(webhook_request(BODY, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_signature_rejected() {
    let state = make_state(GatewayOptions {
        webhook_secret: Some("s".to_string()),
        ..Default::default()
    });
    let app = router(state);

    let sig = compute_signature("s", BODY.as_bytes());
    let mut chars: Vec<char> = sig.chars().collect();
    let last = chars.len() - 1;
    chars[last] = if chars[last] == '0' { '1' } else { '0' };
    let tampered: String = chars.into_iter().collect();

    let response = app
        .oneshot(webhook_request(BODY, Some(&tampered)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_no_secret_skips_signature_check() {
    let state = make_state(GatewayOptions::default());
    let app = router(state);

    let response = app.oneshot(webhook_request(BODY, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let state = make_state(GatewayOptions::default());
    let app = router(state);

    let response = app
        .oneshot(webhook_request("{not json", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_object_rejected() {
    let state = make_state(GatewayOptions::default());
    let app = router(state);

    let response = app.oneshot(webhook_request("{}", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_non_post_method_rejected() {
    let state = make_state(GatewayOptions::default());
    let app = router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/webhook")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = make_state(GatewayOptions::default());
    let app = router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_endpoint_reports_idle_supervisor() {
    let state = make_state(GatewayOptions::default());
    let app = router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/status")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_string(response).await;
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["process"]["running"], false);
    assert_eq!(value["process"]["pid"], 0);
}
