use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use hearth_auth::{RotationResult, SessionError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// The same request may succeed later; nothing about the session changed.
    #[serde(default, skip_serializing_if = "is_false")]
    pub retryable: bool,
    /// The session was ended because of suspicious activity; warn the user.
    #[serde(default, skip_serializing_if = "is_false")]
    pub security_notice: bool,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            retryable: false,
            security_notice: false,
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// HTTP status for a session failure.
pub fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::NotFound(_) | SessionError::Expired | SessionError::ReplayDetected { .. } => {
            StatusCode::UNAUTHORIZED
        }
        SessionError::IdentityMismatch => StatusCode::FORBIDDEN,
        SessionError::Configuration(_) | SessionError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_code(err: &SessionError) -> &'static str {
    match err {
        SessionError::StoreUnavailable(_) => "store_unavailable",
        SessionError::ReplayDetected { .. } => "session_compromised",
        SessionError::IdentityMismatch => "identity_mismatch",
        SessionError::NotFound(_) | SessionError::Expired => "reauthentication_required",
        SessionError::Configuration(_) | SessionError::Internal(_) => "internal_error",
    }
}

impl From<SessionError> for ErrorResponse {
    fn from(err: SessionError) -> Self {
        let message = match &err {
            // Don't leak store internals to clients.
            SessionError::Internal(_) | SessionError::Configuration(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        Self {
            error: error_code(&err).to_string(),
            message,
            retryable: err.is_retryable(),
            security_notice: err.is_security_event(),
        }
    }
}

/// Map a service failure to the tuple every handler returns.
pub fn session_error(err: SessionError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Session operation failed: {}", err);
    }
    (status, Json(ErrorResponse::from(err)))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
    pub user_id: Uuid,
}

/// Rotate a refresh token
/// POST /api/auth/refresh
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> (StatusCode, Json<RotationResult>) {
    let result = state
        .refresh
        .rotate_refresh_token(&request.refresh_token, request.user_id)
        .await;

    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            if status_for(e).is_server_error() {
                tracing::error!("Refresh token rotation failed: {}", e);
            }
            status_for(e)
        }
    };

    (status, Json(RotationResult::from(result)))
}
