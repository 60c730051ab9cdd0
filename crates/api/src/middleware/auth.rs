use crate::handlers::auth::{ApiError, ErrorResponse};
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use hearth_auth::token;
use std::fmt;
use std::sync::Arc;

/// Shortest service key accepted at startup.
pub const MIN_SERVICE_KEY_LEN: usize = 32;

/// Credential shared with the backends allowed to manage sessions.
///
/// Only the SHA-256 digest is kept in memory; presented keys are hashed and
/// compared in constant time.
#[derive(Clone)]
pub struct ServiceKey {
    hash: String,
}

impl ServiceKey {
    pub fn new(key: &str) -> Self {
        Self {
            hash: token::hash_token(key),
        }
    }

    pub fn matches(&self, presented: &str) -> bool {
        token::compare(presented, &self.hash)
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ServiceKey(***)")
    }
}

fn unauthorized(error: &str, message: &str) -> ApiError {
    (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(error, message)))
}

/// Pull the bearer credential out of the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized("missing_auth_header", "Authorization header is required"))?
        .to_str()
        .map_err(|_| unauthorized("invalid_auth_header", "Invalid Authorization header format"))?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        unauthorized(
            "invalid_auth_scheme",
            "Authorization header must use Bearer scheme",
        )
    })
}

/// Middleware for session management routes: only callers holding the
/// service key may create, inspect or revoke sessions.
pub async fn require_service_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = extract_bearer_token(request.headers())?;

    if !state.service_key.matches(presented) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected request with invalid service key"
        );
        return Err(unauthorized("invalid_service_key", "Invalid service credential"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_service_key_matches_only_itself() {
        let key = ServiceKey::new("a-very-long-internal-service-key-0001");
        assert!(key.matches("a-very-long-internal-service-key-0001"));
        assert!(!key.matches("a-very-long-internal-service-key-0002"));
        assert!(!key.matches(""));
        assert_eq!(format!("{:?}", key), "ServiceKey(***)");
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        let (status, body) = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.error, "missing_auth_header");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let (_, body) = extract_bearer_token(&headers).unwrap_err();
        assert_eq!(body.error, "invalid_auth_scheme");

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc");
    }
}
