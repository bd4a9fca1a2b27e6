use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use brain_capture::WatchStatus;
use brain_tracker::{ReconcileEngine, WebhookOutcome};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::watch;

mod endpoints;
mod server_bootstrap;
mod types;
mod webhook_signature;

pub use endpoints::{
    DEFAULT_INTEGRATION_BIND, INTEGRATION_CREATE_ENDPOINT, INTEGRATION_STATUS_ENDPOINT,
    INTEGRATION_SYNC_ENDPOINT, INTEGRATION_WEBHOOK_ENDPOINT, WEBHOOK_SIGNATURE_HEADER,
};
pub use server_bootstrap::{build_integration_router, run_integration_server};
use types::{CreateIssueRequest, IntegrationApiError};
use webhook_signature::verify_webhook_signature;

#[derive(Debug, Clone)]
pub struct IntegrationServerConfig {
    pub bind: String,
}

impl Default for IntegrationServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_INTEGRATION_BIND.to_string(),
        }
    }
}

/// Shared state behind every integration route.
pub struct IntegrationServerState {
    engine: Arc<ReconcileEngine>,
    webhook_secret: Option<String>,
    mailbox_status: watch::Receiver<WatchStatus>,
}

impl IntegrationServerState {
    pub fn new(
        engine: Arc<ReconcileEngine>,
        webhook_secret: Option<String>,
        mailbox_status: watch::Receiver<WatchStatus>,
    ) -> Self {
        let webhook_secret = webhook_secret
            .map(|secret| secret.trim().to_string())
            .filter(|secret| !secret.is_empty());
        Self {
            engine,
            webhook_secret,
            mailbox_status,
        }
    }
}

async fn handle_integration_webhook(
    State(state): State<Arc<IntegrationServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = state.webhook_secret.as_deref() {
        let signature = headers
            .get(WEBHOOK_SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if let Err(error) = verify_webhook_signature(&body, signature, secret) {
            tracing::warn!(%error, "rejected tracker webhook");
            return IntegrationApiError::unauthorized(error.to_string()).into_response();
        }
    }

    let payload = match serde_json::from_slice::<Value>(&body) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(%error, "ignoring tracker webhook with invalid JSON body");
            return webhook_ack();
        }
    };

    match state.engine.apply_webhook_payload(&payload).await {
        Ok(WebhookOutcome::Completed(change)) => {
            tracing::info!(
                identifier = %change.identifier,
                state = %change.state,
                "tracker webhook completed ledger commitment"
            );
        }
        Ok(outcome) => {
            tracing::debug!(?outcome, "tracker webhook left ledger unchanged");
        }
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "tracker webhook failed to update ledger");
        }
    }
    webhook_ack()
}

fn webhook_ack() -> Response {
    (StatusCode::OK, Json(json!({ "ok": true }))).into_response()
}

async fn handle_integration_sync(State(state): State<Arc<IntegrationServerState>>) -> Response {
    match state.engine.reconcile_all().await {
        Ok(changes) => {
            tracing::info!(completed = changes.len(), "manual tracker sync finished");
            (StatusCode::OK, Json(json!({ "ok": true, "changes": changes }))).into_response()
        }
        Err(error) => {
            tracing::error!(error = %format!("{error:#}"), "manual tracker sync failed");
            IntegrationApiError::internal(format!("{error:#}")).into_response()
        }
    }
}

async fn handle_integration_create(
    State(state): State<Arc<IntegrationServerState>>,
    body: Bytes,
) -> Response {
    let request = match serde_json::from_slice::<CreateIssueRequest>(&body) {
        Ok(request) => request,
        Err(error) => {
            return IntegrationApiError::bad_request(format!("invalid JSON body: {error}"))
                .into_response();
        }
    };
    let (Some(team), Some(title)) = (request.team(), request.title()) else {
        return IntegrationApiError::bad_request("team and title are required").into_response();
    };

    match state
        .engine
        .tracker()
        .create_issue(team, title, request.description())
        .await
    {
        Ok(issue) => {
            tracing::info!(identifier = %issue.identifier, "tracker issue created");
            (StatusCode::OK, Json(json!({ "ok": true, "issue": issue }))).into_response()
        }
        Err(error) => {
            tracing::warn!(team, %error, "tracker issue creation failed");
            IntegrationApiError::internal(error.to_string()).into_response()
        }
    }
}

async fn handle_integration_status(State(state): State<Arc<IntegrationServerState>>) -> Response {
    let mailbox = state.mailbox_status.borrow().clone();
    (
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "mailbox": mailbox,
            "tracker": {
                "configured": state.engine.tracker().is_configured(),
                "webhook_signature_required": state.webhook_secret.is_some(),
            },
            "ledger": state.engine.ledger().path().display().to_string(),
        })),
    )
        .into_response()
}
