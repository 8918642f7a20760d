use super::handlers;
use crate::server::state::AppState;
use axum::{routing::get, Router};

/// Public auth routes that don't require authentication
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", get(handlers::login_page))
        .route("/auth/login/{provider}", get(handlers::login_start))
        .route("/auth/callback", get(handlers::oauth_callback))
        .route("/auth/exchange", get(handlers::exchange))
        .route("/auth/logout", get(handlers::logout))
}
