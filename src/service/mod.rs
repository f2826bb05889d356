//! Assistant-service seam
//!
//! The remote protocol client is a collaborator: the session only needs a
//! way to construct it (`AssistantConnector`), start conversations
//! (`AssistantClient`), and write to or stop a live conversation
//! (`Conversation`). Everything the service reports comes back through the
//! session mailbox as `ServiceEvent`s and id-tagged `ConversationEvent`s.

pub mod echo;

use crate::integration::config::{AudioConfig, AuthConfig};
use crate::messages::{ScreenData, Transcription};
use crate::session::EventSender;
use crate::Result;

pub use echo::EchoConnector;

/// Generation number of a conversation
///
/// Assigned by the session for every start request, strictly increasing, so
/// events from a superseded conversation can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ConversationId(u64);

impl ConversationId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything the service client needs to open one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    /// Id the client must echo in `Started` and tag conversation events with
    pub id: ConversationId,
    pub audio: AudioConfig,
    pub language_code: String,
    /// Text-mode query; `None` starts a voice turn
    pub text_query: Option<String>,
}

impl StartRequest {
    pub fn is_text(&self) -> bool {
        self.text_query.is_some()
    }
}

/// Builds an assistant client from credentials
pub trait AssistantConnector: Send {
    /// Construct the client; it reports through `events` from then on
    fn connect(&self, auth: &AuthConfig, events: EventSender) -> Result<Box<dyn AssistantClient>>;
}

/// Session factory of the remote assistant
pub trait AssistantClient: Send {
    /// Begin a conversation; completion arrives as `ServiceEvent::Started`
    /// or `ServiceEvent::Error`
    fn start(&mut self, request: StartRequest) -> Result<()>;
}

/// One live duplex conversation stream
pub trait Conversation: Send {
    /// Write captured microphone audio
    fn write(&mut self, audio: &[u8]) -> Result<()>;

    /// Stop the outbound stream; the service follows up with `Ended`
    fn stop(&mut self);
}

/// Lifecycle events of the service client itself
pub enum ServiceEvent {
    Ready,
    Error(String),
    Started {
        id: ConversationId,
        conversation: Box<dyn Conversation>,
    },
}

impl std::fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceEvent::Ready => write!(f, "Ready"),
            ServiceEvent::Error(e) => f.debug_tuple("Error").field(e).finish(),
            ServiceEvent::Started { id, .. } => {
                f.debug_struct("Started").field("id", id).finish_non_exhaustive()
            }
        }
    }
}

/// Typed events of one conversation, in service delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// Response audio in the configured output encoding
    AudioData(Vec<u8>),
    /// The user finished speaking
    EndOfUtterance,
    DeviceAction(serde_json::Value),
    Transcription(Transcription),
    Response(String),
    ScreenData(ScreenData),
    /// Final event of the conversation
    Ended {
        error: Option<String>,
        follow_up: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_ids_increase() {
        let first = ConversationId::default().next();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.get(), 2);
        assert_eq!(second.to_string(), "#2");
    }

    #[test]
    fn test_start_request_mode() {
        let mut request = StartRequest {
            id: ConversationId::new(1),
            audio: AudioConfig::default(),
            language_code: "en-US".to_string(),
            text_query: None,
        };
        assert!(!request.is_text());

        request.text_query = Some("what's the weather".to_string());
        assert!(request.is_text());
    }
}
