//! Orchestrator for the spoken-dialogue session
//!
//! Runs the session core on its own worker thread. Every collaborator posts
//! into the session mailbox; the worker handles one input at a time and
//! fires scheduled `say()` calls when they fall due.

use crate::audio::{Microphone, Player};
use crate::commands::CommandRegistry;
use crate::integration::config::SessionConfig;
use crate::messages::Notification;
use crate::service::AssistantConnector;
use crate::session::{
    EventSender, Input, SessionCommand, SessionCore, SessionParts, SessionSnapshot,
    SharedSessionState,
};
use crate::utils::{Mailbox, NotificationHub};
use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Handle for controlling the session from any thread
#[derive(Clone)]
pub struct SessionHandle {
    /// Mailbox sender
    events: EventSender,

    /// Notification fan-out
    hub: NotificationHub,

    /// Published session state
    shared: SharedSessionState,
}

impl SessionHandle {
    /// Construct the assistant client
    pub fn authenticate(&self) -> Result<()> {
        self.events.command(SessionCommand::Authenticate)
    }

    /// Start a turn; a query is tried as a local command first
    pub fn assist(&self, query: Option<&str>) -> Result<()> {
        self.events
            .command(SessionCommand::Assist(query.map(str::to_string)))
    }

    /// Speak `sentence` after `delay`, or only report ready when `silent`
    pub fn say(&self, sentence: &str, delay: Duration, silent: bool) -> Result<()> {
        self.events.command(SessionCommand::Say {
            sentence: sentence.to_string(),
            delay,
            silent,
        })
    }

    pub fn play_ping(&self) -> Result<()> {
        self.events.command(SessionCommand::PlayPing)
    }

    /// Force-stop and start a fresh voice turn
    pub fn reset(&self) -> Result<()> {
        self.events.command(SessionCommand::Reset)
    }

    pub fn stop_conversation(&self, force: bool) -> Result<()> {
        self.events
            .command(SessionCommand::StopConversation { force })
    }

    /// Run `text` as a local command and wait for whether it matched
    pub fn run_command(&self, text: &str, queue: bool) -> Result<bool> {
        let (reply, matched) = bounded(1);
        self.events.command(SessionCommand::RunCommand {
            text: text.to_string(),
            queue,
            reply,
        })?;
        matched
            .recv()
            .map_err(|e| ParleyError::ChannelError(format!("No reply from session: {}", e)))
    }

    /// Stop the session worker
    pub fn shutdown(&self) -> Result<()> {
        self.events.command(SessionCommand::Shutdown)
    }

    /// Receive every notification emitted from now on
    pub fn subscribe(&self) -> Receiver<Notification> {
        self.hub.subscribe()
    }

    /// Get a snapshot of the session state
    pub fn state(&self) -> SessionSnapshot {
        self.shared.snapshot()
    }

    /// Sender for collaborators that report into the session
    pub fn event_sender(&self) -> EventSender {
        self.events.clone()
    }
}

/// Owns the session core until it is moved onto the worker thread
pub struct Orchestrator {
    core: SessionCore,
    inputs: Receiver<Input>,
}

impl Orchestrator {
    /// Create an orchestrator around collaborators that post into `mailbox`
    pub fn new(
        config: SessionConfig,
        parts: SessionParts,
        mailbox: Mailbox,
    ) -> Result<(Self, SessionHandle)> {
        config.validate()?;

        let (events, inputs) = mailbox.into_parts();
        let hub = NotificationHub::new();
        let shared = SharedSessionState::new();

        let handle = SessionHandle {
            events: events.clone(),
            hub: hub.clone(),
            shared: shared.clone(),
        };
        let core = SessionCore::new(config, parts, events, hub, shared);

        Ok((Self { core, inputs }, handle))
    }

    /// Start the worker thread
    ///
    /// The thread exits after `SessionHandle::shutdown`.
    pub fn start(self) -> Result<JoinHandle<()>> {
        let Self { mut core, inputs } = self;

        thread::Builder::new()
            .name("parley-session".to_string())
            .spawn(move || {
                info!("Session worker started");

                loop {
                    let input = match core.next_deadline() {
                        Some(deadline) => match inputs.recv_deadline(deadline) {
                            Ok(input) => Some(input),
                            Err(RecvTimeoutError::Timeout) => None,
                            Err(RecvTimeoutError::Disconnected) => {
                                warn!("Session mailbox disconnected");
                                break;
                            }
                        },
                        None => match inputs.recv() {
                            Ok(input) => Some(input),
                            Err(_) => {
                                warn!("Session mailbox disconnected");
                                break;
                            }
                        },
                    };

                    if let Some(input) = input {
                        if !core.handle_input(input) {
                            debug!("Shutdown handled");
                            break;
                        }
                    }
                    core.run_due(Instant::now());
                }

                info!("Session worker stopped");
            })
            .map_err(|e| ParleyError::ChannelError(format!("Failed to spawn session worker: {}", e)))
    }
}

/// Builder for creating an orchestrator
pub struct OrchestratorBuilder {
    config: SessionConfig,
    connector: Option<Box<dyn AssistantConnector>>,
    microphone: Option<Box<dyn Microphone>>,
    player: Option<Box<dyn Player>>,
    commands: Option<Box<dyn CommandRegistry>>,
}

impl OrchestratorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            connector: None,
            microphone: None,
            player: None,
            commands: None,
        }
    }

    /// Set the complete configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_connector(mut self, connector: impl AssistantConnector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    pub fn with_microphone(mut self, microphone: impl Microphone + 'static) -> Self {
        self.microphone = Some(Box::new(microphone));
        self
    }

    pub fn with_player(mut self, player: impl Player + 'static) -> Self {
        self.player = Some(Box::new(player));
        self
    }

    pub fn with_commands(mut self, commands: impl CommandRegistry + 'static) -> Self {
        self.commands = Some(Box::new(commands));
        self
    }

    /// Build the orchestrator; every collaborator must have been set
    pub fn build(self, mailbox: Mailbox) -> Result<(Orchestrator, SessionHandle)> {
        let parts = SessionParts {
            connector: self.connector.ok_or_else(|| missing("assistant connector"))?,
            microphone: self.microphone.ok_or_else(|| missing("microphone"))?,
            player: self.player.ok_or_else(|| missing("player"))?,
            commands: self.commands.ok_or_else(|| missing("command registry"))?,
        };
        Orchestrator::new(self.config, parts, mailbox)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(part: &str) -> ParleyError {
    ParleyError::ConfigError(format!("No {} configured", part))
}
