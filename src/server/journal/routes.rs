use super::handlers;
use crate::server::state::AppState;
use axum::{routing::get, Router};

/// Diary entry routes; all require an authenticated session
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/entries",
            get(handlers::list_entries).post(handlers::create_entry),
        )
        .route(
            "/entries/{id}",
            get(handlers::get_entry)
                .put(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
}
