//! Per-town session storage.
//!
//! # Concurrency note
//!
//! `SessionStore` is a plain map with no locking. Each town actor owns
//! exactly one and is the only code that ever touches it.

use std::collections::HashMap;

use covey_protocol::PlayerId;
use rand::Rng;

use crate::{Session, SessionError};

/// Issues and tracks the sessions of one town.
///
/// ```text
/// create() ──→ [pending] ──attach_video_token()──→ [live] ──remove()──→ gone
///                  │                                                 ↑
///                  └──────────────────remove()───────────────────────┘
/// ```
///
/// Retired tokens are not remembered. Tokens carry 128 random bits, so
/// the chance of a retired token coming back is negligible (about 2^-64
/// even after 2^32 sessions), and memory stays proportional to the
/// current sessions rather than to every join the town has ever seen.
/// A fresh token is only checked against the current sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    /// Live and pending sessions, keyed by token.
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pending session for `player_id` and returns it.
    pub fn create(&mut self, player_id: PlayerId) -> &Session {
        let mut token = generate_token();
        while self.sessions.contains_key(&token) {
            token = generate_token();
        }

        tracing::debug!(%player_id, "session issued");
        self.sessions.entry(token.clone()).or_insert(Session {
            token,
            player_id,
            video_token: None,
        })
    }

    /// Stores the video token on a pending session, making it live.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidToken`] if the session no longer
    /// exists (it was removed while the video token was being fetched).
    pub fn attach_video_token(
        &mut self,
        token: &str,
        video_token: String,
    ) -> Result<&Session, SessionError> {
        let session = self
            .sessions
            .get_mut(token)
            .ok_or(SessionError::InvalidToken)?;
        session.video_token = Some(video_token);
        Ok(session)
    }

    /// Returns the live (non-pending) session for `token`.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidToken`] for unknown, retired, and
    /// pending tokens alike.
    pub fn authenticate(&self, token: &str) -> Result<&Session, SessionError> {
        self.sessions
            .get(token)
            .filter(|session| !session.is_pending())
            .ok_or(SessionError::InvalidToken)
    }

    /// Retires a session. Returns `None` if it was already gone, which
    /// makes repeated removal harmless.
    pub fn remove(&mut self, token: &str) -> Option<Session> {
        self.sessions.remove(token)
    }

    /// Retires every session at once, returning them.
    pub fn drain(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, session)| session).collect()
    }

    /// Iterates over all current sessions in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Returns the number of current sessions (pending or live).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no current sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
pub(crate) fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    // =====================================================================
    // create()
    // =====================================================================

    #[test]
    fn test_create_returns_pending_session_with_hex_token() {
        let mut store = SessionStore::new();

        let session = store.create(pid(1));

        assert!(session.is_pending());
        assert_eq!(session.player_id, pid(1));
        assert_eq!(session.token.len(), 32);
        assert!(session.token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_create_same_player_twice_gets_distinct_tokens() {
        let mut store = SessionStore::new();

        let first = store.create(pid(1)).token.clone();
        let second = store.create(pid(1)).token.clone();

        assert_ne!(first, second);
        assert_eq!(store.len(), 2);
    }

    // =====================================================================
    // attach_video_token() / authenticate()
    // =====================================================================

    #[test]
    fn test_authenticate_pending_session_returns_invalid_token() {
        let mut store = SessionStore::new();
        let token = store.create(pid(1)).token.clone();

        let result = store.authenticate(&token);

        assert!(matches!(result, Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_attach_video_token_makes_session_live() {
        let mut store = SessionStore::new();
        let token = store.create(pid(1)).token.clone();

        store
            .attach_video_token(&token, "video-1".into())
            .expect("session exists");

        let session = store.authenticate(&token).expect("should be live");
        assert_eq!(session.video_token.as_deref(), Some("video-1"));
    }

    #[test]
    fn test_attach_video_token_after_remove_returns_invalid_token() {
        let mut store = SessionStore::new();
        let token = store.create(pid(1)).token.clone();
        store.remove(&token);

        let result = store.attach_video_token(&token, "late".into());

        assert!(matches!(result, Err(SessionError::InvalidToken)));
    }

    #[test]
    fn test_authenticate_unknown_token_returns_invalid_token() {
        let store = SessionStore::new();
        assert!(matches!(
            store.authenticate("deadbeef"),
            Err(SessionError::InvalidToken)
        ));
    }

    // =====================================================================
    // remove() / drain()
    // =====================================================================

    #[test]
    fn test_remove_retires_token_for_good() {
        let mut store = SessionStore::new();
        let token = store.create(pid(1)).token.clone();
        store.attach_video_token(&token, "v".into()).unwrap();

        assert!(store.remove(&token).is_some());

        assert!(store.authenticate(&token).is_err());
        assert!(store.attach_video_token(&token, "again".into()).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_twice_is_noop() {
        let mut store = SessionStore::new();
        let token = store.create(pid(1)).token.clone();

        assert!(store.remove(&token).is_some());
        assert!(store.remove(&token).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_removed_token_is_not_reissued() {
        let mut store = SessionStore::new();
        let token = store.create(pid(1)).token.clone();
        store.remove(&token);

        for i in 0..100 {
            assert_ne!(store.create(pid(i)).token, token);
        }
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_drain_empties_store() {
        let mut store = SessionStore::new();
        store.create(pid(1));
        store.create(pid(2));

        let drained = store.drain();

        assert_eq!(drained.len(), 2);
        assert!(store.is_empty());
    }
}
