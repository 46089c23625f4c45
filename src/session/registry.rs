//! # Session Registry
//!
//! Process-wide mapping from client id to live session state, and the only
//! mutable state shared across sessions. Inserted on connect, removed by the
//! session's controller once draining has completed, looked up by metrics
//! queries. Nothing else in the process reaches across session boundaries.

use crate::session::metrics::{MetricsSnapshot, SessionMetrics};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Lifecycle of one session.
///
/// ## Transitions:
/// `Idle` (connected, no audio yet) → `Streaming` (first frame) → `Draining`
/// (close or transport loss; the pipeline flushes everything still buffered)
/// → `Closed` (metrics frozen, registry entry removed). Draining is never
/// skipped: a session cannot be destroyed with unaccounted buffered audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Draining,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Streaming => "streaming",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        }
    }
}

/// Shared view of one session: identity, lifecycle state and metrics.
///
/// The controller task is the single writer for state transitions; metrics
/// queries and health reporting only read.
pub struct SessionHandle {
    pub client_id: String,
    pub metrics: Arc<SessionMetrics>,
    state: RwLock<SessionState>,
}

impl SessionHandle {
    fn new(client_id: String) -> Self {
        Self {
            client_id,
            metrics: Arc::new(SessionMetrics::new()),
            state: RwLock::new(SessionState::Idle),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap()
    }

    pub fn set_state(&self, new_state: SessionState) {
        *self.state.write().unwrap() = new_state;
    }

    /// True while the session may accept raw audio frames.
    pub fn accepts_audio(&self) -> bool {
        matches!(self.state(), SessionState::Idle | SessionState::Streaming)
    }
}

/// Concurrent map of active sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    max_concurrent_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_concurrent_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_concurrent_sessions,
        }
    }

    /// Register a new session for a client id.
    ///
    /// Rejects the connection when the session limit is reached or the client
    /// id is already streaming; a second connection must not share the first
    /// one's timeline.
    pub fn insert(&self, client_id: &str) -> Result<Arc<SessionHandle>, String> {
        let mut sessions = self.sessions.write().unwrap();

        if sessions.len() >= self.max_concurrent_sessions {
            return Err(format!(
                "maximum concurrent sessions ({}) reached",
                self.max_concurrent_sessions
            ));
        }

        if sessions.contains_key(client_id) {
            return Err(format!("client id '{}' already has an active session", client_id));
        }

        let handle = Arc::new(SessionHandle::new(client_id.to_string()));
        sessions.insert(client_id.to_string(), handle.clone());

        Ok(handle)
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().unwrap().get(client_id).cloned()
    }

    /// Remove a session after draining completed.
    pub fn remove(&self, client_id: &str) -> bool {
        self.sessions.write().unwrap().remove(client_id).is_some()
    }

    /// Metrics lookup distinguishing a found session from an unknown id.
    pub fn metrics_snapshot(&self, client_id: &str) -> Option<MetricsSnapshot> {
        self.get(client_id).map(|handle| handle.metrics.snapshot())
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let registry = SessionRegistry::new(4);
        registry.insert("alice").unwrap();

        assert!(registry.get("alice").is_some());
        assert!(registry.metrics_snapshot("alice").is_some());
        assert_eq!(registry.active_count(), 1);
    }

    #[test]
    fn test_unknown_id_is_not_found() {
        let registry = SessionRegistry::new(4);
        assert!(registry.get("nobody").is_none());
        assert!(registry.metrics_snapshot("nobody").is_none());
    }

    #[test]
    fn test_duplicate_client_id_rejected() {
        let registry = SessionRegistry::new(4);
        registry.insert("alice").unwrap();
        assert!(registry.insert("alice").is_err());
    }

    #[test]
    fn test_session_limit_enforced() {
        let registry = SessionRegistry::new(2);
        registry.insert("a").unwrap();
        registry.insert("b").unwrap();
        assert!(registry.insert("c").is_err());

        registry.remove("a");
        assert!(registry.insert("c").is_ok());
    }

    #[test]
    fn test_sessions_do_not_share_metrics() {
        let registry = SessionRegistry::new(4);
        let alice = registry.insert("alice").unwrap();
        let bob = registry.insert("bob").unwrap();

        alice.metrics.record_ingested(10.0);
        alice.metrics.record_processed(4.0);
        bob.metrics.record_ingested(2.0);

        let alice_snap = registry.metrics_snapshot("alice").unwrap();
        let bob_snap = registry.metrics_snapshot("bob").unwrap();
        assert_eq!(alice_snap.total_audio_seconds, 10.0);
        assert_eq!(alice_snap.processed_audio_seconds, 4.0);
        assert_eq!(bob_snap.total_audio_seconds, 2.0);
        assert_eq!(bob_snap.processed_audio_seconds, 0.0);
    }

    #[test]
    fn test_state_transitions_visible_through_handle() {
        let registry = SessionRegistry::new(4);
        let handle = registry.insert("alice").unwrap();
        assert_eq!(handle.state(), SessionState::Idle);
        assert!(handle.accepts_audio());

        handle.set_state(SessionState::Streaming);
        assert!(handle.accepts_audio());

        handle.set_state(SessionState::Draining);
        assert!(!handle.accepts_audio());
        assert_eq!(registry.get("alice").unwrap().state(), SessionState::Draining);
    }
}
