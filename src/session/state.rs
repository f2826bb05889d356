//! Session lifecycle state
//!
//! `SessionState` is owned by the session core and changed only in response
//! to pipeline and conversation events. Other threads observe it through
//! `SharedSessionState`, which holds a snapshot published after every input
//! the core processes.

use crate::service::ConversationId;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

/// High-level state of the spoken-dialogue session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing in progress
    #[default]
    Idle,
    /// A voice conversation is being started
    Loading,
    /// Microphone is open and streaming to the assistant
    Listening,
    /// Waiting on a command check or on the assistant to answer
    Waiting,
    /// The assistant is streaming its response
    Responding,
    /// The turn is over and the next assist() may start
    Ready,
}

impl SessionState {
    /// Check if the microphone may be open in this state
    pub fn is_listening(&self) -> bool {
        matches!(self, SessionState::Listening)
    }

    /// Check if a turn is in progress
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Loading
                | SessionState::Listening
                | SessionState::Waiting
                | SessionState::Responding
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Loading => write!(f, "Loading"),
            SessionState::Listening => write!(f, "Listening"),
            SessionState::Waiting => write!(f, "Waiting"),
            SessionState::Responding => write!(f, "Responding"),
            SessionState::Ready => write!(f, "Ready"),
        }
    }
}

/// Immutable snapshot of the session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub authenticated: bool,
    pub microphone_enabled: bool,
    pub active_conversation: Option<ConversationId>,
    pub pending_command: bool,
    pub follow_on: bool,
}

/// Thread-safe view of the session published by the core
#[derive(Clone, Default)]
pub struct SharedSessionState {
    inner: Arc<RwLock<SessionSnapshot>>,
}

impl SharedSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published snapshot
    pub(crate) fn publish(&self, snapshot: SessionSnapshot) {
        *self.inner.write() = snapshot;
    }

    /// Get a snapshot of current state (no lock held after return)
    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.read().state
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().authenticated
    }

    pub fn is_microphone_enabled(&self) -> bool {
        self.inner.read().microphone_enabled
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.inner.read().active_conversation
    }

    pub fn has_pending_command(&self) -> bool {
        self.inner.read().pending_command
    }
}
