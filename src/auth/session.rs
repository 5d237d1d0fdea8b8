//! Dashboard session store (spec §4.5): an in-memory map from a random
//! 128-bit token to the operator identity and expiry. The core is a
//! single process with one shared database handle, so there is no need
//! for a distributed session backend — the teacher's own auth-service
//! keeps session state in-process the same way (see SPEC_FULL.md's
//! architecture-collapse note).

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Session {
    pub operator_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a random, URL-safe 128-bit session token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

/// Thread-safe in-memory session table, shared via `Arc` in `AppState`.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session for `operator_id`, valid for `ttl_seconds`.
    #[must_use]
    pub fn create(&self, operator_id: &str, ttl_seconds: i64) -> String {
        let token = generate_token();
        let session = Session {
            operator_id: operator_id.to_string(),
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
        };
        self.inner.write().insert(token.clone(), session);
        token
    }

    /// Look up `token`, returning `None` if absent or expired. Expired
    /// entries are evicted lazily on lookup.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<Session> {
        let mut guard = self.inner.write();
        match guard.get(token) {
            Some(session) if session.expires_at > Utc::now() => Some(session.clone()),
            Some(_) => {
                guard.remove(token);
                None
            }
            None => None,
        }
    }

    pub fn revoke(&self, token: &str) {
        self.inner.write().remove(token);
    }

    /// Remove every expired entry. Intended to be run periodically.
    pub fn sweep(&self) {
        let now = Utc::now();
        self.inner.write().retain(|_, session| session.expires_at > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_look_up_session() {
        let store = SessionStore::new();
        let token = store.create("operator-1", 3600);
        let session = store.get(&token).unwrap();
        assert_eq!(session.operator_id, "operator-1");
    }

    #[test]
    fn expired_session_is_evicted_on_lookup() {
        let store = SessionStore::new();
        let token = store.create("operator-1", -1);
        assert!(store.get(&token).is_none());
    }

    #[test]
    fn revoke_removes_session() {
        let store = SessionStore::new();
        let token = store.create("operator-1", 3600);
        store.revoke(&token);
        assert!(store.get(&token).is_none());
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
    }
}
