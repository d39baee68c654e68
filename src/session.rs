//! Conversation Memory (C10): a bounded per-session turn history with
//! process-wide LRU eviction across sessions. No cross-restart persistence.

use crate::config::SessionConfig;
use crate::types::Turn;
use moka::sync::Cache;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One session's mutable state: turn history and pinned language.
struct SessionState {
    history: VecDeque<Turn>,
    /// Write-once until `reset_language`; `None` before the first turn.
    language: Option<String>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            history: VecDeque::new(),
            language: None,
        }
    }
}

/// Process-wide conversation memory. `max_sessions` bounds the number of live
/// sessions (LRU-evicted beyond that); `history_length` bounds turns kept per
/// session (oldest dropped first).
pub struct ConversationMemory {
    sessions: Cache<String, Arc<Mutex<SessionState>>>,
    history_length: usize,
}

impl ConversationMemory {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Cache::new(config.max_sessions),
            history_length: config.history_length,
        }
    }

    fn session(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        self.sessions
            .get_with(session_id.to_string(), || Arc::new(Mutex::new(SessionState::new())))
    }

    /// Returns the pinned language if one has been set, `None` on a brand new
    /// session (the caller should detect and pin it via [`Self::pin_language`]).
    pub fn language(&self, session_id: &str) -> Option<String> {
        self.session(session_id)
            .lock()
            .expect("session mutex poisoned")
            .language
            .clone()
    }

    /// Pins the session's language if it hasn't been pinned yet. A no-op on a
    /// session that already has one (write-once-until-`reset_language`).
    pub fn pin_language(&self, session_id: &str, language: &str) {
        let session = self.session(session_id);
        let mut state = session.lock().expect("session mutex poisoned");
        if state.language.is_none() {
            state.language = Some(language.to_string());
        }
    }

    /// Clears the pinned language, allowing the next turn to re-detect it.
    pub fn reset_language(&self, session_id: &str) {
        self.session(session_id)
            .lock()
            .expect("session mutex poisoned")
            .language = None;
    }

    /// Wipes a session's entire state — history and pinned language — so the
    /// next turn starts as if it were brand new. Distinct from
    /// `reset_language`, which only clears the language pin.
    pub fn reset(&self, session_id: &str) {
        self.sessions.invalidate(session_id);
    }

    /// Returns up to the last `k` turns, oldest first.
    pub fn last_turns(&self, session_id: &str, k: usize) -> Vec<Turn> {
        let session = self.session(session_id);
        let state = session.lock().expect("session mutex poisoned");
        state
            .history
            .iter()
            .rev()
            .take(k)
            .rev()
            .cloned()
            .collect()
    }

    /// Appends a turn, dropping the oldest if the session is at capacity.
    pub fn append(&self, session_id: &str, turn: Turn) {
        let session = self.session(session_id);
        let mut state = session.lock().expect("session mutex poisoned");
        if state.history.len() >= self.history_length {
            state.history.pop_front();
        }
        state.history.push_back(turn);
    }

    pub fn session_count(&self) -> u64 {
        self.sessions.entry_count()
    }
}
