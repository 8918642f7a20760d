use crate::db::profiles::NewProfile;
use crate::server::auth::pkce::{derive_code_challenge, generate_code_verifier};
use crate::server::auth::session::{
    self, AuthenticatedUser, Session, ATTR_ACCESS_TOKEN, ATTR_REFRESH_TOKEN, ATTR_USER_NAME,
};
use crate::server::auth::supabase::TokenExchangeResponse;
use crate::server::frontend::render_template;
use crate::server::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Deep link scheme the native app shell intercepts to route the handover
/// token into its embedded web view
const NATIVE_DEEP_LINK_BASE: &str = "mindlog://auth/callback";

/// Extract the externally visible base URL (scheme + host) for callback URLs
///
/// Preference order: X-Forwarded-Proto/X-Forwarded-Host (set by a reverse
/// proxy; only the first comma-separated value counts) over the raw Host
/// header over the configured public URL. Getting this wrong behind a proxy
/// produces callback URLs on the wrong host, and with them session cookies
/// the browser refuses to send back.
fn extract_request_base_url(headers: &HeaderMap, public_url: &str) -> String {
    let forwarded_host = first_forwarded_value(headers, "x-forwarded-host");
    let host = forwarded_host.or_else(|| {
        headers
            .get("host")
            .and_then(|h| h.to_str().ok())
            .map(|h| h.trim().to_string())
    });

    if let Some(host) = host.filter(|h| !h.is_empty()) {
        let scheme =
            first_forwarded_value(headers, "x-forwarded-proto").unwrap_or_else(|| "http".into());
        return format!("{}://{}", scheme, host);
    }

    public_url.trim_end_matches('/').to_string()
}

/// First comma-separated value of a forwarding header, trimmed
fn first_forwarded_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

/// Decide whether a request originates from the native app shell
///
/// The explicit `source=app` parameter is authoritative when present. Without
/// it we fall back to heuristics: a WebView-flavored User-Agent, then a
/// "native" marker remembered in the session. The Custom Tab and the final
/// WebView callback may present different signals depending on OS and browser
/// behavior, which is why all three exist.
fn native_client_origin(
    source: Option<&str>,
    headers: &HeaderMap,
    session: Option<&Session>,
) -> bool {
    if let Some(source) = source {
        return source == "app";
    }

    let user_agent = headers
        .get("user-agent")
        .and_then(|ua| ua.to_str().ok())
        .unwrap_or("");
    if user_agent.contains("; wv") || user_agent.contains("MindlogApp") {
        return true;
    }

    session.map(|s| s.native_client).unwrap_or(false)
}

/// Decode the URL-embedded PKCE verifier from the native callback
fn decode_verifier_param(v: &str) -> Option<String> {
    let bytes = Base64UrlUnpadded::decode_vec(v).ok()?;
    String::from_utf8(bytes).ok()
}

/// Plain 302 redirect; OAuth user agents follow Found across the flow
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [("Location", location)]).into_response()
}

/// Redirect back to the login page with a machine-readable error code,
/// preserving the native/web origin so the client UI can react appropriately
fn login_error_redirect(error: &str, native: bool) -> Response {
    let target = if native {
        format!("/auth/login?source=app&error={}", error)
    } else {
        format!("/auth/login?error={}", error)
    };
    found(&target)
}

/// Derive a display name from the provider's user metadata, falling back to
/// the email's local part
fn derive_display_name(metadata: Option<&serde_json::Value>, email: &str) -> String {
    for key in ["full_name", "name"] {
        if let Some(name) = metadata
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            return name.to_string();
        }
    }
    email.split('@').next().unwrap_or(email).to_string()
}

/// Derive an avatar URL from the provider's user metadata, if any
fn derive_avatar_url(metadata: Option<&serde_json::Value>) -> Option<String> {
    for key in ["avatar_url", "picture"] {
        if let Some(url) = metadata
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            return Some(url.to_string());
        }
    }
    None
}

/// Synthesize a unique username for a first login: email local part plus the
/// first 8 hex characters of the provider user id
fn synthesize_username(email: &str, user_id: Uuid) -> String {
    let local_part = email.split('@').next().unwrap_or(email);
    let id_hex = user_id.simple().to_string();
    format!("{}_{}", local_part, &id_hex[..8])
}

/// Turn a successful token exchange into a principal plus the attribute set
/// to install into a session, creating the local profile if it does not exist
async fn materialize_session(
    state: &AppState,
    token_response: &TokenExchangeResponse,
) -> anyhow::Result<(AuthenticatedUser, HashMap<String, String>)> {
    let user = &token_response.user;
    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Provider returned a non-UUID user id {:?}: {}", user.id, e))?;

    let metadata = user.user_metadata.as_ref();
    let display_name = derive_display_name(metadata, &user.email);

    if !state.profiles.exists_by_id(user_id).await? {
        let profile = NewProfile {
            id: user_id,
            username: synthesize_username(&user.email, user_id),
            display_name: display_name.clone(),
            avatar_url: derive_avatar_url(metadata),
        };
        // A concurrent duplicate login can still race past the existence
        // check; the unique constraint surfaces it as a retryable failure
        state.profiles.create(profile).await?;
    }

    let mut attributes = HashMap::new();
    attributes.insert(
        ATTR_ACCESS_TOKEN.to_string(),
        token_response.access_token.clone(),
    );
    attributes.insert(ATTR_USER_NAME.to_string(), display_name);
    if let Some(refresh_token) = &token_response.refresh_token {
        attributes.insert(ATTR_REFRESH_TOKEN.to_string(), refresh_token.clone());
    }

    Ok((AuthenticatedUser::new(user.id.clone()), attributes))
}

/// Install a freshly materialized login into a brand-new session and redirect
/// to the app's main view
fn establish_session_and_redirect(
    state: &AppState,
    principal: AuthenticatedUser,
    attributes: HashMap<String, String>,
    native_client: bool,
) -> Response {
    let session_id = state.sessions.create(Session {
        principal: Some(principal),
        attributes,
        pkce_verifier: None,
        native_client,
    });
    let cookie = session::create_session_cookie(&session_id, state.cookie_secure);

    (
        StatusCode::FOUND,
        [("Location", "/"), ("Set-Cookie", cookie.as_str())],
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginPageQuery {
    pub error: Option<String>,
    pub source: Option<String>,
}

/// Login page, also the landing spot for every failed login attempt
#[instrument(skip(params))]
pub async fn login_page(
    Query(params): Query<LoginPageQuery>,
) -> Result<Response, (StatusCode, String)> {
    let mut context = tera::Context::new();
    context.insert("error", &params.error);
    context.insert("native", &(params.source.as_deref() == Some("app")));

    Ok(render_template("auth-login.html.tera", &context)?.into_response())
}

#[derive(Debug, Deserialize)]
pub struct LoginStartQuery {
    /// `source=app` marks a login started from the native app shell
    pub source: Option<String>,
}

/// Start the OAuth2 authorization code flow with PKCE
///
/// Generates a verifier/challenge pair and redirects the user to the identity
/// provider. How the verifier is recovered at callback time depends on the
/// client: web clients keep it in their session, native clients get it
/// embedded into the callback URL because the provider's consent page renders
/// in a Custom Tab that shares no cookies with the app's WebView.
#[instrument(skip(state, headers, params))]
pub async fn login_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Query(params): Query<LoginStartQuery>,
) -> Result<Response, (StatusCode, String)> {
    let session_id = session::extract_session_cookie(&headers);
    let current_session = session_id.as_deref().and_then(|id| state.sessions.get(id));

    // Already logged in: no new PKCE challenge, straight back to the app
    if current_session
        .as_ref()
        .map(|s| s.is_authenticated())
        .unwrap_or(false)
    {
        tracing::debug!("Login requested by an already-authenticated session");
        return Ok(found("/"));
    }

    let native = native_client_origin(params.source.as_deref(), &headers, current_session.as_ref());

    let code_verifier = generate_code_verifier();
    let code_challenge = derive_code_challenge(&code_verifier);

    let base_url = extract_request_base_url(&headers, &state.public_url);
    let mut callback_url = format!("{}/auth/callback", base_url);

    let mut set_cookie: Option<String> = None;

    if native {
        // Remember the native origin for User-Agent-less fallback detection,
        // and round-trip the verifier through the redirect URL itself
        let verifier_param = Base64UrlUnpadded::encode_string(code_verifier.as_bytes());
        callback_url = format!("{}?source=app&v={}", callback_url, verifier_param);

        let updated = session_id
            .as_deref()
            .map(|id| state.sessions.update(id, |s| s.native_client = true))
            .unwrap_or(false);
        if !updated {
            let id = state.sessions.create(Session {
                native_client: true,
                ..Default::default()
            });
            set_cookie = Some(session::create_session_cookie(&id, state.cookie_secure));
        }
    } else {
        // Web flow: park the verifier in the browser-correlated session
        let updated = session_id
            .as_deref()
            .map(|id| {
                state
                    .sessions
                    .update(id, |s| s.pkce_verifier = Some(code_verifier.clone()))
            })
            .unwrap_or(false);
        if !updated {
            let id = state.sessions.create(Session {
                pkce_verifier: Some(code_verifier.clone()),
                ..Default::default()
            });
            set_cookie = Some(session::create_session_cookie(&id, state.cookie_secure));
        }
    }

    let authorize_url = state
        .supabase
        .authorize_url(&provider, &callback_url, &code_challenge);

    tracing::info!(
        provider = %provider,
        native = native,
        "Redirecting to identity provider for authentication"
    );

    let response = match set_cookie {
        Some(cookie) => (
            StatusCode::FOUND,
            [
                ("Location", authorize_url.as_str()),
                ("Set-Cookie", cookie.as_str()),
            ],
        )
            .into_response(),
        None => found(&authorize_url),
    };

    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub source: Option<String>,
    /// Base64url-encoded PKCE verifier, present on the native flow only
    pub v: Option<String>,
}

/// OAuth2 callback from the identity provider
///
/// Recovers the PKCE verifier, exchanges the authorization code for tokens
/// and completes the login: web clients get their session installed right
/// here, native clients get a one-time handover token wrapped into a deep
/// link for the app shell to carry into its WebView.
#[instrument(skip(state, headers, params))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackQuery>,
) -> Result<Response, (StatusCode, String)> {
    let session_id = session::extract_session_cookie(&headers);
    let current_session = session_id.as_deref().and_then(|id| state.sessions.get(id));

    let native = native_client_origin(params.source.as_deref(), &headers, current_session.as_ref());

    if params.error.is_some() || params.code.is_none() {
        tracing::warn!(
            provider_error = ?params.error,
            "OAuth callback without usable authorization code"
        );
        return Ok(login_error_redirect("auth_failed", native));
    }
    let code = params.code.as_deref().unwrap_or_default();

    // Prefer the URL-embedded verifier (native) over the session-stored one
    // (web); clear the stored copy immediately - the verifier is single-use
    // no matter how the exchange turns out
    let url_verifier = params.v.as_deref().and_then(decode_verifier_param);
    let session_verifier = current_session
        .as_ref()
        .and_then(|s| s.pkce_verifier.clone());
    if session_verifier.is_some() {
        if let Some(id) = session_id.as_deref() {
            state.sessions.update(id, |s| s.pkce_verifier = None);
        }
    }

    let Some(code_verifier) = url_verifier.or(session_verifier) else {
        tracing::warn!("OAuth callback without a recoverable PKCE verifier");
        return Ok(login_error_redirect("invalid_session", native));
    };

    let token_response = match state.supabase.exchange_code(code, &code_verifier).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Token exchange failed: {:#}", e);
            return Ok(login_error_redirect("login_process_failed", native));
        }
    };

    let (principal, attributes) = match materialize_session(&state, &token_response).await {
        Ok(materialized) => materialized,
        Err(e) => {
            tracing::error!("Failed to materialize session: {:#}", e);
            return Ok(login_error_redirect("login_process_failed", native));
        }
    };

    if native {
        // The WebView that will own the session cannot see this response's
        // cookies - wrap the login into a one-time token and let the native
        // shell carry it across via the deep link
        let token = state.handover.create_token(principal, attributes);
        let deep_link = format!("{}?token={}", NATIVE_DEEP_LINK_BASE, token);

        tracing::info!("Native login completed, handing over via deep link");

        let mut context = tera::Context::new();
        context.insert("deep_link", &deep_link);
        return Ok(render_template("auth-handover.html.tera", &context)?.into_response());
    }

    // Web flow: the session is established in this same HTTP context. The
    // pre-login session (if any) is replaced wholesale so an anonymous id
    // never becomes an authenticated one.
    if let Some(id) = session_id.as_deref() {
        state.sessions.remove(id);
    }

    tracing::info!("Web login completed, establishing session");
    Ok(establish_session_and_redirect(
        &state, principal, attributes, false,
    ))
}

#[derive(Debug, Deserialize)]
pub struct ExchangeQuery {
    pub token: String,
}

/// WebView-facing consumer of the handover token
///
/// Repeating the exact request after a first success must not re-grant a
/// session: the single-use guarantee of the store makes the replay fail.
#[instrument(skip(state, params))]
pub async fn exchange(
    State(state): State<AppState>,
    Query(params): Query<ExchangeQuery>,
) -> Result<Response, (StatusCode, String)> {
    let Some((principal, attributes)) = state.handover.consume_token(&params.token) else {
        tracing::warn!("Handover token rejected (invalid, expired or already used)");
        return Ok(found("/auth/login?error=invalid_token"));
    };

    tracing::info!("Handover token consumed, establishing WebView session");

    // A brand-new session scoped to the WebView's own cookie jar
    Ok(establish_session_and_redirect(
        &state, principal, attributes, true,
    ))
}

/// Logout endpoint
///
/// Destroys the server-side session, clears the cookie and returns to the
/// login page.
#[instrument(skip(state, headers))]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    if let Some(session_id) = session::extract_session_cookie(&headers) {
        state.sessions.remove(&session_id);
    }

    let cookie = session::clear_session_cookie(state.cookie_secure);

    tracing::info!("Session terminated, clearing cookie");

    let response = (
        StatusCode::FOUND,
        [("Location", "/auth/login"), ("Set-Cookie", cookie.as_str())],
    )
        .into_response();

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_base_url_prefers_forwarded_headers() {
        let h = headers(&[
            ("x-forwarded-proto", "https"),
            ("x-forwarded-host", "journal.example.com"),
            ("host", "10.0.0.5:3000"),
        ]);
        assert_eq!(
            extract_request_base_url(&h, "http://localhost:3000"),
            "https://journal.example.com"
        );
    }

    #[test]
    fn test_base_url_takes_first_forwarded_value() {
        let h = headers(&[
            ("x-forwarded-proto", "https, http"),
            ("x-forwarded-host", " journal.example.com , internal.proxy "),
        ]);
        assert_eq!(
            extract_request_base_url(&h, "http://localhost:3000"),
            "https://journal.example.com"
        );
    }

    #[test]
    fn test_base_url_falls_back_to_host_header() {
        let h = headers(&[("host", "journal.example.com:8080")]);
        assert_eq!(
            extract_request_base_url(&h, "http://localhost:3000"),
            "http://journal.example.com:8080"
        );
    }

    #[test]
    fn test_base_url_falls_back_to_public_url() {
        let h = headers(&[]);
        assert_eq!(
            extract_request_base_url(&h, "http://localhost:3000/"),
            "http://localhost:3000"
        );
    }

    #[test]
    fn test_native_detection_explicit_source_wins() {
        let webview = headers(&[(
            "user-agent",
            "Mozilla/5.0 (Linux; Android 14; wv) AppleWebKit/537.36",
        )]);

        // An explicit non-app source overrides the WebView user agent
        assert!(!native_client_origin(Some("web"), &webview, None));
        assert!(native_client_origin(Some("app"), &headers(&[]), None));
    }

    #[test]
    fn test_native_detection_user_agent_heuristic() {
        let webview = headers(&[(
            "user-agent",
            "Mozilla/5.0 (Linux; Android 14; wv) AppleWebKit/537.36",
        )]);
        assert!(native_client_origin(None, &webview, None));

        let shell = headers(&[("user-agent", "MindlogApp/1.4 (iOS)")]);
        assert!(native_client_origin(None, &shell, None));

        let desktop = headers(&[("user-agent", "Mozilla/5.0 (X11; Linux x86_64)")]);
        assert!(!native_client_origin(None, &desktop, None));
    }

    #[test]
    fn test_native_detection_session_marker_fallback() {
        let desktop = headers(&[("user-agent", "Mozilla/5.0 (X11; Linux x86_64)")]);
        let native_session = Session {
            native_client: true,
            ..Default::default()
        };
        assert!(native_client_origin(None, &desktop, Some(&native_session)));
        assert!(!native_client_origin(
            None,
            &desktop,
            Some(&Session::default())
        ));
    }

    #[test]
    fn test_verifier_param_round_trip() {
        let verifier = crate::server::auth::pkce::generate_code_verifier();
        let encoded = Base64UrlUnpadded::encode_string(verifier.as_bytes());
        assert_eq!(decode_verifier_param(&encoded).as_deref(), Some(verifier.as_str()));
    }

    #[test]
    fn test_verifier_param_rejects_garbage() {
        assert!(decode_verifier_param("!!!not-base64url!!!").is_none());
    }

    #[test]
    fn test_derive_display_name() {
        let metadata = serde_json::json!({"full_name": "Alice Kim", "name": "alice"});
        assert_eq!(derive_display_name(Some(&metadata), "a@b.com"), "Alice Kim");

        let metadata = serde_json::json!({"name": "alice"});
        assert_eq!(derive_display_name(Some(&metadata), "a@b.com"), "alice");

        // Fall back to the email local part
        assert_eq!(derive_display_name(None, "a@b.com"), "a");
        let empty = serde_json::json!({"full_name": ""});
        assert_eq!(derive_display_name(Some(&empty), "carol@b.com"), "carol");
    }

    #[test]
    fn test_derive_avatar_url() {
        let metadata = serde_json::json!({"avatar_url": "https://img/a.png", "picture": "https://img/b.png"});
        assert_eq!(
            derive_avatar_url(Some(&metadata)).as_deref(),
            Some("https://img/a.png")
        );

        let metadata = serde_json::json!({"picture": "https://img/b.png"});
        assert_eq!(
            derive_avatar_url(Some(&metadata)).as_deref(),
            Some("https://img/b.png")
        );

        assert_eq!(derive_avatar_url(None), None);
    }

    #[test]
    fn test_synthesize_username() {
        let id: Uuid = "11111111-1111-1111-1111-111111111111".parse().unwrap();
        assert_eq!(synthesize_username("a@b.com", id), "a_11111111");
    }
}
