//! HTTP surface: the card service's webhook callback plus admin endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::board::WebhookRegistrar;
use crate::board::client::WebhookSubscription;
use crate::error::WebhookError;
use crate::pipeline::types::WebhookPayload;
use crate::pipeline::{EventProcessor, SweepProcessor};
use crate::store::ViolationStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub processor: Arc<EventProcessor>,
    pub sweep: Arc<SweepProcessor>,
    pub store: Arc<dyn ViolationStore>,
    pub registrar: Arc<dyn WebhookRegistrar>,
    /// Default callback URL for webhook registration.
    pub public_url: Option<String>,
}

/// Build the router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(health).head(probe).post(receive))
        .route("/health", get(health))
        .route("/api/violations", get(list_violations))
        .route("/api/sweep", post(run_sweep))
        .route("/api/webhooks", post(register_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "board-warden"
    }))
}

/// The card service sends HEAD to the callback URL before activating a webhook.
async fn probe() -> StatusCode {
    StatusCode::OK
}

// ── Webhook callback ────────────────────────────────────────────────────

/// Always acknowledged; processing runs detached.
async fn receive(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "Ignoring unparseable webhook body");
            return StatusCode::OK;
        }
    };

    let action_type = payload.action.action_type.clone();
    let Some(event) = payload.action.into_event() else {
        debug!(action_type = %action_type, "Webhook action has no card");
        return StatusCode::OK;
    };

    info!(
        event_id = %event.id,
        card_id = %event.card_id,
        kind = event.label(),
        "Webhook event received"
    );
    let processor = Arc::clone(&state.processor);
    tokio::spawn(async move {
        processor.process(&event).await;
    });
    StatusCode::OK
}

// ── Admin ───────────────────────────────────────────────────────────────

async fn list_violations(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_all_invalid().await {
        Ok(records) => (StatusCode::OK, Json(serde_json::json!(records))),
        Err(e) => {
            error!(error = %e, "Failed to list violations");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to list violations"})),
            )
        }
    }
}

async fn run_sweep(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.sweep.run().await)
}

#[derive(Debug, Default, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "idModel", default)]
    id_model: Option<String>,
    #[serde(rename = "callbackURL", default)]
    callback_url: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn build_subscription(
    request: RegisterRequest,
    public_url: Option<&str>,
) -> Result<WebhookSubscription, WebhookError> {
    let description = present(request.description)
        .ok_or_else(|| WebhookError::Validation("Webhook description is required.".into()))?;
    let id_model = present(request.id_model)
        .ok_or_else(|| WebhookError::Validation("Card service model id is required.".into()))?;
    let callback_url = present(request.callback_url)
        .or_else(|| public_url.map(str::to_string))
        .ok_or_else(|| WebhookError::Validation("Callback URL is required.".into()))?;

    Ok(WebhookSubscription {
        description,
        id_model,
        callback_url,
    })
}

async fn register_webhook(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> impl IntoResponse {
    let subscription = match build_subscription(body, state.public_url.as_deref()) {
        Ok(subscription) => subscription,
        Err(e) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({"error": e.to_string()})),
            );
        }
    };

    match state.registrar.register_webhook(&subscription).await {
        Ok(registered) => {
            info!(webhook_id = %registered.id, model = %subscription.id_model, "Webhook registered");
            (StatusCode::OK, Json(serde_json::json!(registered)))
        }
        Err(e) => {
            warn!(error = %e, "Webhook registration failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": e.to_string()})),
            )
        }
    }
}
