use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::server::auth::session;
use crate::server::state::AppState;

/// Session authentication middleware for the JSON API
///
/// Resolves the session cookie to a principal, loads the backing profile and
/// injects it into request extensions for the handlers. Requests without a
/// live authenticated session are rejected with 401.
pub async fn session_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let session_id = session::extract_session_cookie(req.headers()).ok_or((
        StatusCode::UNAUTHORIZED,
        "No session cookie".to_string(),
    ))?;

    let session = state.sessions.get(&session_id).ok_or((
        StatusCode::UNAUTHORIZED,
        "Invalid or expired session".to_string(),
    ))?;

    let principal = session.principal.ok_or((
        StatusCode::UNAUTHORIZED,
        "Session is not authenticated".to_string(),
    ))?;

    // A principal whose user id is not a UUID, or one without a profile row,
    // indicates a broken contract with the identity provider rather than a
    // recoverable client condition
    let profile_id: Uuid = principal.user_id.parse().map_err(|_| {
        tracing::error!(
            user_id = %principal.user_id,
            "Authenticated principal carries a non-UUID user id"
        );
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Invalid principal".to_string(),
        )
    })?;

    let profile = state
        .profiles
        .find_by_id(profile_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load profile for session: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            )
        })?
        .ok_or_else(|| {
            tracing::error!(
                profile_id = %profile_id,
                "Authenticated principal has no profile record"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Profile missing for authenticated session".to_string(),
            )
        })?;

    req.extensions_mut().insert(principal);
    req.extensions_mut().insert(profile);

    Ok(next.run(req).await)
}
