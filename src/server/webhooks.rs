//! Webhook receiver and usage-check HTTP surface
//!
//! Routes:
//! - `POST /webhook` — verify `X-Signature`, then dispatch on
//!   `meta.event_name` into the ledger. 400 on a missing or bad signature,
//!   500 when the shared secret is unset (misconfiguration), 200 with an
//!   `ignored` marker for unrecognized event names.
//! - `POST /can-perform` — atomic allow/deny decision for a generation or
//!   regeneration.
//! - `GET /users/{email}` — ledger record, for local inspection.
//! - `GET /health` — liveness probe.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::server::ledger::{Ledger, LedgerAction, LedgerError};
use crate::server::signature;

const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub webhook_secret: Option<String>,
}

/// Build the router with trace and permissive CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/can-perform", post(can_perform))
        .route("/users/{email}", get(get_user))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Tolerant shape of a provider webhook delivery.
#[derive(Debug, Deserialize)]
struct WebhookEvent {
    meta: EventMeta,
    #[serde(default)]
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventMeta {
    event_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct EventData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    attributes: EventAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct EventAttributes {
    #[serde(default)]
    user_email: Option<String>,
    #[serde(default)]
    plan: Option<String>,
    /// Some provider payloads carry the plan as the variant name instead
    #[serde(default)]
    variant_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(secret) = &state.webhook_secret else {
        error!("webhook received but no shared secret is configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Webhook secret is not configured.",
        );
    };

    let Some(provided) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        warn!("webhook missing signature header");
        return error_response(StatusCode::BAD_REQUEST, "Missing X-Signature header.");
    };

    if !signature::verify(secret, &body, provided) {
        warn!("webhook signature verification failed");
        return error_response(StatusCode::BAD_REQUEST, "Invalid signature.");
    }

    // Parse only after the signature checks out
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            return error_response(StatusCode::BAD_REQUEST, "Body is not valid JSON.");
        }
    };

    let event_name = event.meta.event_name.as_str();
    info!(event = event_name, "webhook verified");

    let result = match event_name {
        "subscription_created" | "subscription_updated" => {
            let Some(email) = event.data.attributes.user_email.as_deref() else {
                return error_response(StatusCode::BAD_REQUEST, "Event is missing user_email.");
            };
            let plan = event
                .data
                .attributes
                .plan
                .as_deref()
                .or(event.data.attributes.variant_name.as_deref())
                .unwrap_or("free");
            let status = event.data.attributes.status.as_deref().unwrap_or("active");
            state
                .ledger
                .upsert_subscription(email, plan, status, event.data.id.as_deref())
        }
        "subscription_cancelled" => {
            let Some(email) = event.data.attributes.user_email.as_deref() else {
                return error_response(StatusCode::BAD_REQUEST, "Event is missing user_email.");
            };
            state.ledger.cancel_subscription(email)
        }
        "order_created" => {
            let Some(email) = event.data.attributes.user_email.as_deref() else {
                return error_response(StatusCode::BAD_REQUEST, "Event is missing user_email.");
            };
            let order_id = event.data.id.as_deref().unwrap_or("unknown");
            state.ledger.record_order(email, order_id)
        }
        other => {
            info!(event = other, "ignoring unrecognized webhook event");
            return (StatusCode::OK, Json(json!({ "ignored": true }))).into_response();
        }
    };

    match result {
        Ok(()) => (StatusCode::OK, Json(json!({ "received": true }))).into_response(),
        Err(e) => ledger_failure(e),
    }
}

#[derive(Debug, Deserialize)]
struct CanPerformRequest {
    email: String,
    #[serde(flatten)]
    action: LedgerAction,
}

async fn can_perform(
    State(state): State<AppState>,
    Json(request): Json<CanPerformRequest>,
) -> Response {
    let email = request.email.trim();
    if email.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Email is required.");
    }
    match state.ledger.can_perform(email, &request.action) {
        Ok(decision) => (StatusCode::OK, Json(decision)).into_response(),
        Err(e) => ledger_failure(e),
    }
}

async fn get_user(State(state): State<AppState>, Path(email): Path<String>) -> Response {
    match state.ledger.get_user(email.trim()) {
        Ok(Some(user)) => (StatusCode::OK, Json(user)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "No ledger record for that email."),
        Err(e) => ledger_failure(e),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn ledger_failure(e: LedgerError) -> Response {
    error!(error = %e, "ledger operation failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Ledger operation failed.")
}
