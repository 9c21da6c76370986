//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::models::webhook::{branch_allowed, WebhookPayload};
use crate::process::supervisor::ProcessStatus;
use crate::server::signature::verify_signature;
use crate::server::state::ServerState;
use crate::utils::version_info;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Webhook entry point.
///
/// Non-POST methods are rejected with 405 by the router. Filtered branches
/// and unrecognized repositories are acknowledged with 200 so the sender
/// does not redeliver; only auth and malformed-payload failures are non-2xx.
/// The response never waits for the dispatched work.
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // Signature check, skipped entirely when no secret is configured
    if let Some(secret) = &state.gateway.webhook_secret {
        let Some(header) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            warn!("Webhook rejected: missing signature header");
            return (StatusCode::UNAUTHORIZED, "missing signature\n".to_string());
        };
        if !verify_signature(secret, &body, header) {
            warn!("Webhook rejected: invalid signature");
            return (StatusCode::UNAUTHORIZED, "invalid signature\n".to_string());
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Webhook rejected: malformed payload: {}", e);
            return (StatusCode::BAD_REQUEST, "malformed payload\n".to_string());
        }
    };
    if let Err(e) = payload.validate() {
        warn!("Webhook rejected: {}", e);
        return (StatusCode::BAD_REQUEST, format!("invalid payload: {}\n", e));
    }

    let branch = payload.branch().to_string();
    info!(
        "Webhook received: repo={} branch={} commit={}",
        payload.repository.name, branch, payload.head_commit.id
    );

    // Filtered branches are a successful no-op, not an error
    if !branch_allowed(&branch, &state.gateway.allowed_branches) {
        info!("Branch {} not in the allow-list, ignoring push", branch);
        return (
            StatusCode::OK,
            format!("branch '{}' is not configured for deployment\n", branch),
        );
    }

    let clone_url = payload.repository.clone_url.clone();

    if !state.gateway.self_update_url.is_empty() && clone_url == state.gateway.self_update_url {
        let updater = state.updater.clone();
        let dispatched = state
            .update_jobs
            .try_spawn(async move { updater.update(&clone_url, &branch).await });
        let message = if dispatched {
            "self-update dispatched\n"
        } else {
            "self-update already in progress\n"
        };
        return (StatusCode::OK, message.to_string());
    }

    if !state.gateway.target_url.is_empty() && clone_url == state.gateway.target_url {
        let deployer = state.deployer.clone();
        let dispatched = state
            .deploy_jobs
            .try_spawn(async move { deployer.deploy(&clone_url, &branch).await });
        let message = if dispatched {
            "deployment dispatched\n"
        } else {
            "deployment already in progress\n"
        };
        return (StatusCode::OK, message.to_string());
    }

    info!("Repository {} not configured, ignoring push", clone_url);
    (
        StatusCode::OK,
        format!("repository '{}' is not configured for deployment\n", clone_url),
    )
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "pushdeploy".to_string(),
        version: version.version,
    })
}

/// Supervisor status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub process: ProcessStatus,
    pub has_backup: bool,
}

/// Supervisor status handler
pub async fn status_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let process = state.supervisor.status().await;
    let has_backup = state.updater.has_backup().await;
    Json(StatusResponse {
        process,
        has_backup,
    })
}
