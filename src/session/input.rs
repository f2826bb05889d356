//! Messages processed by the session core
//!
//! Every source posts into one mailbox, so events from a single source are
//! handled in the order they were sent and no two handlers interleave.

use crate::audio::{MicrophoneEvent, PlayerEvent};
use crate::service::{ConversationEvent, ConversationId, ServiceEvent};
use crate::{ParleyError, Result};
use crossbeam_channel::Sender;
use std::time::Duration;

/// Requests made through the public API
#[derive(Debug)]
pub enum SessionCommand {
    /// Construct the assistant client
    Authenticate,
    /// Start a turn, optionally with a text query
    Assist(Option<String>),
    /// Speak a sentence after a delay
    Say {
        sentence: String,
        delay: Duration,
        silent: bool,
    },
    /// Play the acknowledgment tone
    PlayPing,
    /// Force-stop and immediately start a fresh voice turn
    Reset,
    /// Stop the active conversation
    StopConversation { force: bool },
    /// Run a local command; the reply carries whether it matched
    RunCommand {
        text: String,
        queue: bool,
        reply: Sender<bool>,
    },
    /// Stop the session worker
    Shutdown,
}

/// Everything the session core reacts to
#[derive(Debug)]
pub enum Input {
    Command(SessionCommand),
    Service(ServiceEvent),
    Conversation {
        id: ConversationId,
        event: ConversationEvent,
    },
    Microphone(MicrophoneEvent),
    Player(PlayerEvent),
}

/// Cloneable sender into the session mailbox
///
/// Handed to collaborators so they can report asynchronously. Sending never
/// blocks.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: Sender<Input>,
}

impl EventSender {
    pub(crate) fn new(tx: Sender<Input>) -> Self {
        Self { tx }
    }

    pub fn send(&self, input: Input) -> Result<()> {
        self.tx
            .send(input)
            .map_err(|e| ParleyError::ChannelError(format!("Session mailbox closed: {}", e)))
    }

    pub fn command(&self, command: SessionCommand) -> Result<()> {
        self.send(Input::Command(command))
    }

    pub fn service(&self, event: ServiceEvent) -> Result<()> {
        self.send(Input::Service(event))
    }

    pub fn conversation(&self, id: ConversationId, event: ConversationEvent) -> Result<()> {
        self.send(Input::Conversation { id, event })
    }

    pub fn microphone(&self, event: MicrophoneEvent) -> Result<()> {
        self.send(Input::Microphone(event))
    }

    pub fn player(&self, event: PlayerEvent) -> Result<()> {
        self.send(Input::Player(event))
    }
}
