//! The spoken-dialogue session
//!
//! `core` holds the state machine, `conversation` translates one
//! conversation's events, and `pipeline` wires the audio devices to it.

pub mod conversation;
pub mod core;
pub mod input;
pub mod pipeline;
pub mod state;

pub use conversation::{ConversationPhase, ConversationSession, SessionAction};
pub use core::{SessionCore, SessionParts};
pub use input::{EventSender, Input, SessionCommand};
pub use pipeline::AudioPipeline;
pub use state::{SessionSnapshot, SessionState, SharedSessionState};
