use crate::handlers;
use crate::middleware;
use crate::AppState;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health::health_check))
        // Sessions - Protected (service key)
        .route(
            "/api/sessions",
            post(handlers::sessions::create_session)
                .route_layer(from_fn_with_state(state.clone(), middleware::require_service_key)),
        )
        .route(
            "/api/sessions/:session_id",
            get(handlers::sessions::validate_session)
                .delete(handlers::sessions::revoke_session)
                .route_layer(from_fn_with_state(state.clone(), middleware::require_service_key)),
        )
        .route(
            "/api/users/:user_id/sessions",
            get(handlers::sessions::list_user_sessions)
                .delete(handlers::sessions::revoke_user_sessions)
                .route_layer(from_fn_with_state(state.clone(), middleware::require_service_key)),
        )
        // Refresh token rotation - the refresh token is the credential
        .route("/api/auth/refresh", post(handlers::auth::refresh_token))
        .with_state(state)
}
