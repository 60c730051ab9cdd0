use crate::handlers::auth::{session_error, ApiError, ErrorResponse};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use hearth_auth::{CreatedSession, SessionValidation};
use hearth_models::SessionSummary;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    pub user_id: Uuid,

    #[validate(length(max = 512))]
    pub user_agent: Option<String>,

    #[validate(ip)]
    pub ip_address: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeAllResponse {
    pub revoked: u64,
}

/// Create a session for an already-authenticated user
/// POST /api/sessions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreatedSession>), ApiError> {
    request.validate().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("validation_error", &e.to_string())),
        )
    })?;

    let user_agent = request.user_agent.or_else(|| {
        headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.chars().take(512).collect())
    });

    let created = state
        .sessions
        .create_session(request.user_id, user_agent, request.ip_address)
        .await
        .map_err(session_error)?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// Check whether a session is still usable
/// GET /api/sessions/:session_id
pub async fn validate_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionValidation>, ApiError> {
    state
        .sessions
        .validate_session(session_id)
        .await
        .map(Json)
        .map_err(session_error)
}

/// Revoke a specific session
/// DELETE /api/sessions/:session_id
pub async fn revoke_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .revoke_session(session_id)
        .await
        .map_err(session_error)?;

    Ok(StatusCode::NO_CONTENT)
}

/// List active sessions for a user
/// GET /api/users/:user_id/sessions
pub async fn list_user_sessions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    state
        .sessions
        .list_active_sessions(user_id)
        .await
        .map(Json)
        .map_err(session_error)
}

/// Log a user out everywhere
/// DELETE /api/users/:user_id/sessions
pub async fn revoke_user_sessions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RevokeAllResponse>, ApiError> {
    let revoked = state
        .sessions
        .revoke_all_user_sessions(user_id)
        .await
        .map_err(session_error)?;

    Ok(Json(RevokeAllResponse { revoked }))
}
