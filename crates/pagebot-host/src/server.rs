//! HTTP transport. The only place pipeline outcomes become responses.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pagebot_ai::HistorySummary;
use pagebot_core::event::{LEGACY_SIGNATURE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use pagebot_core::{PageEvent, Payload, SignatureHeaders};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::pipeline::Pipeline;
use crate::signature::{self, Rejection};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, webhook_secret: Option<String>) -> Self {
        Self {
            pipeline,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }
}

#[derive(Serialize)]
struct Ack<'a> {
    received: bool,
    processed_page_id: Option<&'a str>,
}

/// Status and optional JSON body returned for a webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookReply {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl WebhookReply {
    fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }

    fn ack(processed_page_id: Option<&str>) -> Self {
        let body = serde_json::to_value(Ack {
            received: true,
            processed_page_id,
        })
        .unwrap_or_else(|_| json!({ "received": true }));
        Self::json(StatusCode::OK, body)
    }
}

impl IntoResponse for WebhookReply {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/notion-webhook", post(webhook))
        .route("/healthz", get(healthz))
        .route("/history", get(history))
        .with_state(state)
}

pub async fn serve(bind: SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(%bind, "webhook server listening");
    axum::serve(listener, router(state))
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn history(State(state): State<AppState>) -> Json<HistorySummary> {
    Json(state.pipeline.completions().history().summary())
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    handle_webhook(&state, &headers, &body).await.into_response()
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn signature_headers(headers: &HeaderMap) -> SignatureHeaders {
    SignatureHeaders {
        timestamp: header(headers, TIMESTAMP_HEADER),
        signature: header(headers, SIGNATURE_HEADER),
        legacy_signature: header(headers, LEGACY_SIGNATURE_HEADER),
    }
}

fn rejection_status(rejection: Rejection) -> StatusCode {
    match rejection {
        Rejection::MissingSignature => StatusCode::BAD_REQUEST,
        Rejection::Invalid => StatusCode::UNAUTHORIZED,
        Rejection::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn handshake_reply(payload: &Payload) -> WebhookReply {
    match payload {
        Payload::Challenge(challenge) => {
            info!("answering webhook challenge");
            WebhookReply::json(StatusCode::OK, json!({ "challenge": challenge }))
        }
        _ => {
            info!("received webhook verification token");
            WebhookReply {
                status: StatusCode::OK,
                body: None,
            }
        }
    }
}

/// Answer one webhook delivery.
///
/// Handshakes are answered before signature checks. Past verification the
/// reply is always an acknowledgment, whatever the pipeline did.
pub async fn handle_webhook(state: &AppState, headers: &HeaderMap, body: &[u8]) -> WebhookReply {
    let payload = Payload::parse(body);
    if payload.is_handshake() {
        return handshake_reply(&payload);
    }

    let sig_headers = signature_headers(headers);
    match signature::verify(body, &sig_headers, state.webhook_secret.as_deref()) {
        Ok(scheme) => debug!(?scheme, "webhook signature verified"),
        Err(rejection) => {
            warn!(%rejection, "rejecting webhook");
            return WebhookReply::json(
                rejection_status(rejection),
                json!({ "error": rejection.to_string() }),
            );
        }
    }

    let Payload::Event(envelope) = payload else {
        warn!("webhook body is not an event object");
        return WebhookReply::ack(None);
    };
    let event = PageEvent::new(envelope, body.to_vec(), sig_headers);

    match state.pipeline.handle(&event).await {
        Ok(outcome) => {
            debug!(?outcome, "webhook handled");
            WebhookReply::ack(outcome.processed_page_id())
        }
        Err(e) => {
            error!(error = %e, "pipeline failed");
            WebhookReply::ack(e.claimed_page_id())
        }
    }
}
