//! Thin intake layer: parses the wire payload, hands it to the relay and
//! maps core outcomes onto HTTP responses. Validation rejections are the
//! caller's fault (400); conflict rejections describe state the system
//! already holds and answer 200 with a rejected status, the way the
//! upstream alerting integration expects.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::models::{Action, RawSignal, Signal, Verdict};
use crate::relay::Relay;

pub struct AppState {
    pub relay: Arc<Relay>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn webhook(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<RawSignal>,
) -> (StatusCode, Json<Value>) {
    let now = Utc::now();
    let signal = Signal::from_raw(&raw, now.timestamp_millis());

    let reply = match state.relay.handle_signal(&signal, now).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("signal processing failed: {:#}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "reason": "storage unavailable" })),
            );
        }
    };

    match reply.outcome {
        Verdict::Rejected(rejection) => {
            let status = if rejection.is_validation() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::OK
            };
            let mut body = serde_json::to_value(&rejection).unwrap_or_else(|_| json!({}));
            body["status"] = json!("rejected");
            body["message"] = json!(rejection.to_string());
            (status, Json(body))
        }
        Verdict::Accepted(action) => {
            let delivered = reply.delivery.as_ref().map(|d| d.success);
            if delivered == Some(false) {
                // State already moved; only the notification failed.
                return (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "status": "error",
                        "reason": "notification delivery failed",
                        "action": action.label(),
                        "tradeId": signal.trade_id,
                    })),
                );
            }
            let status_label = match action {
                Action::BiasQueued { .. } => "queued",
                _ => "success",
            };
            (
                StatusCode::OK,
                Json(json!({
                    "status": status_label,
                    "action": action.label(),
                    "type": signal.raw_type,
                    "tradeId": signal.trade_id,
                })),
            )
        }
    }
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    match state.relay.health(Utc::now()).await {
        Ok(status) => {
            let mut body = serde_json::to_value(&status).unwrap_or_else(|_| json!({}));
            body["status"] = json!("ok");
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            error!("health query failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error" })),
            )
        }
    }
}
