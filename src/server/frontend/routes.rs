use crate::server::auth::session::{self, ATTR_USER_NAME};
use crate::server::frontend::render_template;
use crate::server::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use tracing::instrument;

pub fn frontend_routes() -> Router<AppState> {
    Router::new().route("/", get(home))
}

/// The application's main view
///
/// Logged-out visitors are sent to the login page; logged-in ones get the
/// journal shell with their display name pulled from the session attributes.
#[instrument(skip(state, headers))]
async fn home(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let session = session::extract_session_cookie(&headers)
        .and_then(|session_id| state.sessions.get(&session_id));

    let Some(session) = session.filter(|s| s.is_authenticated()) else {
        return Ok(Redirect::to("/auth/login").into_response());
    };

    let user_name = session
        .attributes
        .get(ATTR_USER_NAME)
        .map(String::as_str)
        .unwrap_or("there");

    let mut context = tera::Context::new();
    context.insert("user_name", user_name);

    Ok(render_template("index.html.tera", &context)?.into_response())
}
