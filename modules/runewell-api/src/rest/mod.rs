use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use runewell_common::{ProgressionError, ProgressionEvent};

use crate::AppState;

// --- Request bodies ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    user_id: String,
    /// Kept as a string so unknown actions get a typed rejection.
    action_type: String,
    #[serde(default)]
    target_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantRequest {
    #[serde(default)]
    xp_delta: i64,
    #[serde(default)]
    rune_delta: i64,
}

// --- Helpers ---

fn error_response(err: ProgressionError) -> Response {
    match &err {
        ProgressionError::UnknownMetricKey(_) | ProgressionError::InvalidEvent(_) => {
            warn!(error = %err, "Rejected progression request");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
        _ if err.is_retryable() => {
            warn!(error = %err, "Progression request failed, retryable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": err.to_string(), "retryable": true})),
            )
                .into_response()
        }
        _ => {
            warn!(error = %err, "Progression request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": err.to_string()})),
            )
                .into_response()
        }
    }
}

fn respond<T: serde::Serialize>(result: Result<T, ProgressionError>) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(e),
    }
}

// --- Handlers ---

pub async fn api_apply_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EventRequest>,
) -> impl IntoResponse {
    let event = match ProgressionEvent::parse(
        &body.user_id,
        &body.action_type,
        body.target_id.as_deref(),
    ) {
        Ok(event) => event,
        Err(e) => return error_response(e),
    };
    respond(state.engine.apply_event(event).await)
}

pub async fn api_snapshot(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    respond(state.engine.snapshot(&user_id).await)
}

pub async fn api_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    respond(state.engine.profile(&user_id).await)
}

pub async fn api_reconcile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    respond(state.engine.reconcile(&user_id).await)
}

pub async fn api_grant(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(body): Json<GrantRequest>,
) -> impl IntoResponse {
    respond(
        state
            .engine
            .grant(&user_id, body.xp_delta, body.rune_delta)
            .await,
    )
}

pub async fn api_ranks(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    respond(state.engine.list_ranks().await)
}

pub async fn api_badges(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.list_badge_definitions().to_vec())
}
