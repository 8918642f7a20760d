use axum::http::HeaderMap;
use base64ct::{Base64UrlUnpadded, Encoding};
use moka::sync::Cache;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Cookie name carrying the server-side session id
pub const SESSION_COOKIE_NAME: &str = "mindlog_session";

/// Session attribute keys consumed by the rest of the application
pub const ATTR_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const ATTR_USER_NAME: &str = "USER_NAME";
pub const ATTR_REFRESH_TOKEN: &str = "REFRESH_TOKEN";

/// The single authority granted to every logged-in user
pub const AUTHORITY_USER: &str = "user";

/// Resolved identity of a logged-in user
///
/// The principal is passed explicitly through the request-handling call chain
/// (via router state and request extensions) - there is no ambient
/// "current security context".
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    /// Stable user id issued by the identity provider
    pub user_id: String,
    pub authorities: Vec<String>,
}

impl AuthenticatedUser {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            authorities: vec![AUTHORITY_USER.to_string()],
        }
    }
}

/// Server-side session state keyed by the session cookie
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Present once the login flow completed in this HTTP context
    pub principal: Option<AuthenticatedUser>,
    /// Opaque attributes installed at login time (access token, display name, ...)
    pub attributes: HashMap<String, String>,
    /// PKCE verifier parked here between login start and callback (web flow only)
    pub pkce_verifier: Option<String>,
    /// Remembered "this browser context belongs to the native app shell" marker
    pub native_client: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

/// In-memory session store backed by a Moka cache
///
/// Sessions expire after the configured idle TTL; an expired session simply
/// forces a fresh login. Swap for an external store to share sessions across
/// server instances.
pub struct SessionStore {
    cache: Arc<Cache<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl)
            .max_capacity(100_000)
            .build();
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Create a fresh session and return its id
    pub fn create(&self, session: Session) -> String {
        let id = generate_opaque_token();
        self.cache.insert(id.clone(), session);
        id
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        self.cache.get(id)
    }

    /// Read-modify-write a session in place; returns false if it does not exist
    pub fn update(&self, id: &str, f: impl FnOnce(&mut Session)) -> bool {
        match self.cache.get(id) {
            Some(mut session) => {
                f(&mut session);
                self.cache.insert(id.to_string(), session);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &str) {
        self.cache.invalidate(id);
    }
}

/// Generate an unguessable opaque token (session ids, handover tokens)
///
/// 32 random bytes base64url encoded = 43 characters
pub fn generate_opaque_token() -> String {
    let mut random_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    Base64UrlUnpadded::encode_string(&random_bytes)
}

/// Parse cookies from a Cookie header value
///
/// This implements RFC 6265 cookie parsing:
/// - Cookies are separated by semicolons
/// - Leading/trailing whitespace is trimmed
/// - Cookie format is "name=value"
fn parse_cookies(cookie_header: &str) -> impl Iterator<Item = (&str, &str)> {
    cookie_header.split(';').filter_map(|cookie| {
        let cookie = cookie.trim();
        cookie.split_once('=')
    })
}

/// Create the session cookie for a freshly created session
///
/// The cookie is configured with:
/// - HttpOnly: Prevents JavaScript access (XSS protection)
/// - Secure: HTTPS-only transmission (configurable for development)
/// - SameSite=Lax: CSRF protection while allowing top-level navigation
/// - Path=/: Valid for all paths
///
/// No Max-Age is set: the cookie lives as long as the browser context, and the
/// server-side entry expires on its own TTL.
pub fn create_session_cookie(session_id: &str, secure: bool) -> String {
    let mut cookie_parts = vec![
        format!("{}={}", SESSION_COOKIE_NAME, session_id),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        "SameSite=Lax".to_string(),
    ];

    if secure {
        cookie_parts.push("Secure".to_string());
    }

    cookie_parts.join("; ")
}

/// Extract the session id from request headers
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get("cookie")?.to_str().ok()?;

    parse_cookies(cookie_header)
        .find(|(name, _)| *name == SESSION_COOKIE_NAME)
        .map(|(_, value)| value.to_string())
}

/// Create a cookie that clears the session id
///
/// Sets Max-Age=0 to immediately expire the cookie
pub fn clear_session_cookie(secure: bool) -> String {
    let mut cookie_parts = vec![
        format!("{}=", SESSION_COOKIE_NAME),
        "Max-Age=0".to_string(),
        "Path=/".to_string(),
        "HttpOnly".to_string(),
        "SameSite=Lax".to_string(),
    ];

    if secure {
        cookie_parts.push("Secure".to_string());
    }

    cookie_parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_create_and_get_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(Session {
            principal: Some(AuthenticatedUser::new("user-1")),
            ..Default::default()
        });

        let session = store.get(&id).expect("session should exist");
        assert_eq!(session.principal.unwrap().user_id, "user-1");
    }

    #[test]
    fn test_update_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(Session::default());

        let updated = store.update(&id, |s| {
            s.pkce_verifier = Some("verifier".to_string());
            s.native_client = true;
        });
        assert!(updated);

        let session = store.get(&id).unwrap();
        assert_eq!(session.pkce_verifier.as_deref(), Some("verifier"));
        assert!(session.native_client);
    }

    #[test]
    fn test_update_missing_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        assert!(!store.update("nonexistent", |_| {}));
    }

    #[test]
    fn test_remove_session() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id = store.create(Session::default());
        store.remove(&id);
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_session_ttl() {
        let store = SessionStore::new(Duration::from_millis(100));
        let id = store.create(Session::default());

        assert!(store.get(&id).is_some());
        std::thread::sleep(Duration::from_millis(150));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let store = SessionStore::new(Duration::from_secs(60));
        let id1 = store.create(Session::default());
        let id2 = store.create(Session::default());
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 43);
    }

    #[test]
    fn test_create_session_cookie() {
        let cookie = create_session_cookie("abc123", true);
        assert!(cookie.contains("mindlog_session=abc123"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn test_create_session_cookie_insecure_dev() {
        let cookie = create_session_cookie("abc123", false);
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_extract_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("mindlog_session=sid42; other_cookie=value"),
        );
        assert_eq!(extract_session_cookie(&headers), Some("sid42".to_string()));
    }

    #[test]
    fn test_extract_session_cookie_not_present() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("other_cookie=value"));
        assert_eq!(extract_session_cookie(&headers), None);
    }

    #[test]
    fn test_clear_session_cookie() {
        let cookie = clear_session_cookie(true);
        assert!(cookie.contains("mindlog_session="));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Secure"));
    }
}
