use moka::sync::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::session::{generate_opaque_token, AuthenticatedUser};

/// Materialized login data parked between the Custom Tab callback and the
/// WebView exchange request
///
/// The two HTTP contexts do not share a cookie jar, so the completed login
/// cannot be installed directly - it is wrapped into a single-use token that
/// the native shell carries across via a deep link.
#[derive(Debug, Clone)]
struct HandoverEntry {
    principal: AuthenticatedUser,
    attributes: HashMap<String, String>,
    created_at: Instant,
}

/// Store for single-use, short-lived session handover tokens
pub trait HandoverStore: Send + Sync {
    /// Wrap a materialized login into a fresh one-time token
    fn create_token(
        &self,
        principal: AuthenticatedUser,
        attributes: HashMap<String, String>,
    ) -> String;

    /// Atomically consume a token, returning its payload exactly once
    ///
    /// Absent, already-consumed and expired tokens all collapse to `None`:
    /// distinguishing them would leak timing information useful for token
    /// guessing, and the caller's reaction is the same either way.
    fn consume_token(&self, token: &str) -> Option<(AuthenticatedUser, HashMap<String, String>)>;
}

/// In-memory implementation of HandoverStore using a Moka cache
///
/// Entries are evicted at twice the validity window; consumption applies the
/// exact window itself against the entry's creation time. The store does not
/// survive a restart and is not shared across instances - acceptable for a
/// sub-minute token whose loss only forces a re-login, and the narrow trait
/// lets an external TTL-capable key-value store replace it without touching
/// callers.
pub struct InMemoryHandoverStore {
    cache: Arc<Cache<String, HandoverEntry>>,
    ttl: Duration,
}

impl InMemoryHandoverStore {
    /// Create a new InMemoryHandoverStore whose tokens are valid for `ttl`
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .time_to_live(ttl * 2)
            .max_capacity(10_000) // Prevent memory exhaustion from attacks
            .build();

        Self {
            cache: Arc::new(cache),
            ttl,
        }
    }
}

impl HandoverStore for InMemoryHandoverStore {
    fn create_token(
        &self,
        principal: AuthenticatedUser,
        attributes: HashMap<String, String>,
    ) -> String {
        let token = generate_opaque_token();
        self.cache.insert(
            token.clone(),
            HandoverEntry {
                principal,
                attributes,
                created_at: Instant::now(),
            },
        );
        token
    }

    fn consume_token(&self, token: &str) -> Option<(AuthenticatedUser, HashMap<String, String>)> {
        // remove() is the atomic lookup-and-delete: even under concurrent
        // consumption attempts at most one caller observes the entry
        let entry = self.cache.remove(token)?;

        if entry.created_at.elapsed() > self.ttl {
            tracing::debug!("Handover token expired before consumption");
            return None;
        }

        Some((entry.principal, entry.attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attributes() -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("ACCESS_TOKEN".to_string(), "token-abc".to_string());
        attrs.insert("USER_NAME".to_string(), "alice".to_string());
        attrs
    }

    #[test]
    fn test_token_single_use() {
        let store = InMemoryHandoverStore::new(Duration::from_secs(60));
        let token = store.create_token(AuthenticatedUser::new("user-1"), attributes());

        let (principal, attrs) = store.consume_token(&token).expect("first consume succeeds");
        assert_eq!(principal.user_id, "user-1");
        assert_eq!(
            attrs.get("ACCESS_TOKEN").map(String::as_str),
            Some("token-abc")
        );

        // Every subsequent consumption of the same token fails
        assert!(store.consume_token(&token).is_none());
        assert!(store.consume_token(&token).is_none());
    }

    #[test]
    fn test_unknown_token() {
        let store = InMemoryHandoverStore::new(Duration::from_secs(60));
        assert!(store.consume_token("no-such-token").is_none());
    }

    #[test]
    fn test_token_expires() {
        let store = InMemoryHandoverStore::new(Duration::from_millis(50));
        let token = store.create_token(AuthenticatedUser::new("user-1"), attributes());

        // Past the validity window but before cache eviction (2x TTL) the
        // created_at check must still reject the token
        std::thread::sleep(Duration::from_millis(80));
        assert!(store.consume_token(&token).is_none());
    }

    #[test]
    fn test_token_valid_within_window() {
        let store = InMemoryHandoverStore::new(Duration::from_secs(60));
        let token = store.create_token(AuthenticatedUser::new("user-1"), attributes());
        assert!(store.consume_token(&token).is_some());
    }

    #[test]
    fn test_tokens_are_unguessable_shape() {
        let store = InMemoryHandoverStore::new(Duration::from_secs(60));
        let t1 = store.create_token(AuthenticatedUser::new("user-1"), HashMap::new());
        let t2 = store.create_token(AuthenticatedUser::new("user-1"), HashMap::new());
        assert_ne!(t1, t2);
        assert_eq!(t1.len(), 43);
    }

    #[test]
    fn test_concurrent_consumption_single_winner() {
        let store = Arc::new(InMemoryHandoverStore::new(Duration::from_secs(60)));
        let token = store.create_token(AuthenticatedUser::new("user-1"), attributes());

        let threads = 16;
        let barrier = Arc::new(std::sync::Barrier::new(threads));
        let mut handles = Vec::new();

        for _ in 0..threads {
            let store = Arc::clone(&store);
            let token = token.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                store.consume_token(&token).is_some()
            }));
        }

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1, "exactly one concurrent consumer may win");
    }
}
