//! Session core
//!
//! `SessionCore` owns every piece of mutable session state: the assistant
//! client, the active conversation, the pending command, the follow-on flag
//! and the lifecycle state. It is driven one `Input` at a time, either by the
//! orchestrator's worker thread or directly by a caller that pumps the
//! mailbox itself.

use crate::audio::{Microphone, Player};
use crate::commands::{CommandDescriptor, CommandInterceptor, CommandRegistry};
use crate::integration::config::SessionConfig;
use crate::messages::{Notification, SessionError, SessionErrorKind};
use crate::service::{
    AssistantClient, AssistantConnector, Conversation, ConversationEvent, ConversationId,
    ServiceEvent, StartRequest,
};
use crate::session::conversation::{ConversationPhase, ConversationSession, SessionAction};
use crate::session::input::{EventSender, Input, SessionCommand};
use crate::session::pipeline::AudioPipeline;
use crate::session::state::{SessionSnapshot, SessionState, SharedSessionState};
use crate::utils::NotificationHub;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Collaborators the session core drives
pub struct SessionParts {
    pub connector: Box<dyn AssistantConnector>,
    pub microphone: Box<dyn Microphone>,
    pub player: Box<dyn Player>,
    pub commands: Box<dyn CommandRegistry>,
}

/// A start request whose `Started` has not arrived yet
#[derive(Debug, Clone, Copy)]
struct InFlightStart {
    id: ConversationId,
    text_mode: bool,
}

/// A delayed `say()`
#[derive(Debug)]
struct ScheduledSay {
    due: Instant,
    sentence: String,
    silent: bool,
}

pub struct SessionCore {
    config: SessionConfig,
    connector: Box<dyn AssistantConnector>,
    client: Option<Box<dyn AssistantClient>>,
    pipeline: AudioPipeline,
    interceptor: CommandInterceptor,
    conversation: Option<ConversationSession>,
    last_requested: ConversationId,
    in_flight: Option<InFlightStart>,
    follow_on: bool,
    state: SessionState,
    scheduled: Vec<ScheduledSay>,
    events: EventSender,
    hub: NotificationHub,
    shared: SharedSessionState,
}

impl SessionCore {
    pub fn new(
        config: SessionConfig,
        parts: SessionParts,
        events: EventSender,
        hub: NotificationHub,
        shared: SharedSessionState,
    ) -> Self {
        let core = Self {
            config,
            connector: parts.connector,
            client: None,
            pipeline: AudioPipeline::new(parts.microphone, parts.player),
            interceptor: CommandInterceptor::new(parts.commands),
            conversation: None,
            last_requested: ConversationId::default(),
            in_flight: None,
            follow_on: false,
            state: SessionState::Idle,
            scheduled: Vec::new(),
            events,
            hub,
            shared,
        };
        core.publish();
        core
    }

    /// Process one input; returns false once the session has shut down
    pub fn handle_input(&mut self, input: Input) -> bool {
        let running = match input {
            Input::Command(command) => self.handle_command(command),
            Input::Service(event) => {
                self.handle_service_event(event);
                true
            }
            Input::Conversation { id, event } => {
                self.handle_conversation_event(id, event);
                true
            }
            Input::Microphone(event) => {
                self.pipeline
                    .on_microphone_event(event, self.conversation.as_mut());
                true
            }
            Input::Player(event) => {
                if self.pipeline.on_player_event(event, &mut self.follow_on) {
                    self.reset();
                }
                true
            }
        };
        self.publish();
        running
    }

    fn handle_command(&mut self, command: SessionCommand) -> bool {
        debug!("Handling command: {:?}", command);
        match command {
            SessionCommand::Authenticate => self.authenticate(),
            SessionCommand::Assist(query) => self.assist(query),
            SessionCommand::Say {
                sentence,
                delay,
                silent,
            } => self.say(sentence, delay, silent),
            SessionCommand::PlayPing => self.play_ping(),
            SessionCommand::Reset => self.reset(),
            SessionCommand::StopConversation { force } => self.stop_conversation(force),
            SessionCommand::RunCommand { text, queue, reply } => {
                let matched = self.run_command(&text, queue);
                // Callers may read the snapshot as soon as the reply lands
                self.publish();
                let _ = reply.send(matched);
            }
            SessionCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Construct the assistant client
    ///
    /// `ready` follows once the client reports readiness.
    pub fn authenticate(&mut self) {
        if self.client.is_some() {
            info!("Re-authenticating, replacing assistant client");
        }

        match self.connector.connect(&self.config.auth, self.events.clone()) {
            Ok(client) => {
                info!("Assistant client created");
                self.client = Some(client);
            }
            Err(e) => {
                error!("Failed to create assistant client: {}", e);
                self.client = None;
                self.report(SessionError::new(
                    SessionErrorKind::NotAuthenticated,
                    e.user_message(),
                ));
            }
        }
    }

    /// Start a turn
    ///
    /// A non-empty query is checked against the local commands first and
    /// only reaches the assistant as a text query when no command matches.
    /// Without a query a voice turn starts.
    pub fn assist(&mut self, query: Option<String>) {
        // A new turn replaces any follow-up still waiting on playback
        self.follow_on = false;

        let query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        match query {
            Some(query) => {
                self.set_state(SessionState::Waiting);
                self.hub.emit(Notification::Waiting);
                if self.run_command(&query, false) {
                    return;
                }
                self.start_conversation(Some(query));
            }
            None => {
                self.set_state(SessionState::Loading);
                self.hub.emit(Notification::Loading);
                self.start_conversation(None);
            }
        }
    }

    /// Schedule a sentence to be spoken after `delay`
    pub fn say(&mut self, sentence: String, delay: Duration, silent: bool) {
        debug!("Scheduling say in {:?} (silent: {})", delay, silent);
        self.scheduled.push(ScheduledSay {
            due: Instant::now() + delay,
            sentence,
            silent,
        });
    }

    pub fn play_ping(&mut self) {
        self.pipeline.ping();
    }

    /// Force-stop and start a fresh voice turn
    pub fn reset(&mut self) {
        self.stop_conversation(true);
        self.assist(None);
    }

    /// Stop the active conversation
    ///
    /// A force-stop discards buffered response audio and closes the
    /// microphone right away, even with no conversation active. Otherwise the
    /// buffered response plays out and the conversation ends on its own.
    pub fn stop_conversation(&mut self, force: bool) {
        if force {
            self.follow_on = false;
            self.in_flight = None;
            self.pipeline.discard_playback();
            self.pipeline.set_listening(false);
        }

        let Some(session) = self.conversation.as_mut() else {
            debug!("No active conversation to stop");
            if force {
                self.set_state(SessionState::Idle);
            }
            return;
        };

        session.stop(force);
        if force {
            // A pending command needs the conversation to end first
            if !session.has_ended_callback() {
                self.conversation = None;
            }
            self.set_state(SessionState::Idle);
        } else {
            self.pipeline.drain_playback();
            if self.state.is_listening() {
                self.set_state(SessionState::Waiting);
            }
        }
    }

    /// Run `text` as a local command, returning whether it matched
    ///
    /// With `queue` set the command runs once the active conversation
    /// terminates, and the conversation is force-stopped to get there.
    pub fn run_command(&mut self, text: &str, queue: bool) -> bool {
        let Some(command) = self.interceptor.find_command(text) else {
            return false;
        };

        if queue {
            match self.conversation.as_mut() {
                Some(session) if !session.has_ended_callback() => {
                    let pending = self.interceptor.defer(command);
                    session.set_ended_callback(pending);
                    self.stop_conversation(true);
                    return true;
                }
                Some(_) => {
                    warn!("A command is already queued, running '{}' now", command.name);
                }
                None => {
                    debug!("No active conversation, running '{}' now", command.name);
                }
            }
        }

        self.execute_command(&command);
        true
    }

    /// Earliest time a scheduled `say()` is due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduled.iter().map(|s| s.due).min()
    }

    /// Fire every scheduled `say()` due at `now`, oldest first
    pub fn run_due(&mut self, now: Instant) {
        if self.scheduled.is_empty() {
            return;
        }

        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|s| s.due <= now);
        self.scheduled = pending;
        due.sort_by_key(|s| s.due);

        for say in due {
            self.fire_say(say);
        }
        self.publish();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn follow_on(&self) -> bool {
        self.follow_on
    }

    pub fn active_conversation(&self) -> Option<ConversationId> {
        self.conversation.as_ref().map(|c| c.id())
    }

    pub fn microphone_enabled(&self) -> bool {
        self.pipeline.microphone_enabled()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            authenticated: self.client.is_some(),
            microphone_enabled: self.pipeline.microphone_enabled(),
            active_conversation: self.active_conversation(),
            pending_command: self
                .conversation
                .as_ref()
                .is_some_and(|c| c.has_ended_callback()),
            follow_on: self.follow_on,
        }
    }

    fn fire_say(&mut self, say: ScheduledSay) {
        info!("Saying '{}' (silent: {})", say.sentence, say.silent);
        self.stop_conversation(true);

        let sentence = say.sentence.trim();
        if sentence.is_empty() {
            return;
        }

        if say.silent {
            self.emit_ready();
        } else {
            let query = format!("{} {}", self.config.repeat_prefix, sentence);
            self.assist(Some(query));
        }
    }

    fn start_conversation(&mut self, text_query: Option<String>) {
        if self.client.is_none() {
            warn!("Assist requested before authentication");
            self.report(SessionError::new(
                SessionErrorKind::NotAuthenticated,
                "Not connected to the assistant service",
            ));
            self.emit_ready();
            return;
        }

        let id = self.last_requested.next();
        self.last_requested = id;
        let text_mode = text_query.is_some();
        let request = StartRequest {
            id,
            audio: self.config.audio.clone(),
            language_code: self.config.language_code.clone(),
            text_query,
        };

        info!("Starting conversation {} (text: {})", id, text_mode);
        let result = match self.client.as_mut() {
            Some(client) => client.start(request),
            None => return,
        };

        match result {
            Ok(()) => self.in_flight = Some(InFlightStart { id, text_mode }),
            Err(e) => {
                error!("Failed to start conversation {}: {}", id, e);
                self.in_flight = None;
                self.report(SessionError::transport(e.user_message()));
                self.emit_ready();
            }
        }
    }

    fn handle_service_event(&mut self, event: ServiceEvent) {
        match event {
            ServiceEvent::Ready => {
                info!("Assistant service ready");
                self.emit_ready();
            }
            ServiceEvent::Error(message) => {
                error!("Assistant service error: {}", message);
                self.report(SessionError::transport(message));
                // The pending start will never bind
                if self.in_flight.take().is_some() || self.conversation.is_none() {
                    self.emit_ready();
                }
            }
            ServiceEvent::Started { id, conversation } => self.bind_conversation(id, conversation),
        }
    }

    fn bind_conversation(&mut self, id: ConversationId, mut stream: Box<dyn Conversation>) {
        let text_mode = match self.in_flight {
            Some(start) if start.id == id => start.text_mode,
            _ => {
                debug!("Stopping stale conversation {}", id);
                stream.stop();
                return;
            }
        };
        self.in_flight = None;

        if let Some(previous) = self.conversation.take() {
            self.supersede(previous, id);
        }

        info!("Conversation {} started", id);
        self.conversation = Some(ConversationSession::new(id, stream, text_mode));

        if !text_mode {
            self.set_state(SessionState::Listening);
            self.pipeline.set_listening(true);
            self.hub.emit(Notification::Listening);
        }
    }

    /// Terminate a conversation replaced by a newer one
    fn supersede(&mut self, mut previous: ConversationSession, next: ConversationId) {
        info!("Conversation {} superseded by {}", previous.id(), next);
        previous.stop(true);
        if let Some(pending) = previous.take_ended_callback() {
            if !self.interceptor.run(&pending.command) {
                self.report_command_failure(&pending.command);
            }
        }
    }

    fn handle_conversation_event(&mut self, id: ConversationId, event: ConversationEvent) {
        let Some(session) = self.conversation.as_mut().filter(|c| c.id() == id) else {
            debug!("Discarding event from stale conversation {}", id);
            return;
        };

        let actions = session.handle_event(event);
        for action in actions {
            self.apply(action);
        }
    }

    fn apply(&mut self, action: SessionAction) {
        match action {
            SessionAction::AppendAudio(audio) => self.pipeline.play_response(&audio),
            SessionAction::EndOfUtterance => {
                self.pipeline.set_listening(false);
                if self.state.is_listening() {
                    self.set_state(SessionState::Waiting);
                }
            }
            SessionAction::Responding => self.set_state(SessionState::Responding),
            SessionAction::Notify(notification) => self.hub.emit(notification),
            SessionAction::Report(error) => self.report(error),
            SessionAction::Ended { error, follow_up } => self.finish_conversation(error, follow_up),
        }
    }

    fn finish_conversation(&mut self, error: Option<String>, follow_up: bool) {
        let Some(mut session) = self.conversation.take() else {
            return;
        };
        self.pipeline.set_listening(false);

        if let Some(error) = error {
            warn!("Conversation {} ended with error: {}", session.id(), error);
            self.report(SessionError::transport(error));
        }

        if let Some(pending) = session.take_ended_callback() {
            info!("Running queued command '{}'", pending.command.name);
            self.execute_command(&pending.command);
            return;
        }

        self.emit_ready();

        if follow_up && !session.is_text_mode() && session.phase() == ConversationPhase::Live {
            self.schedule_follow_up();
        }
    }

    fn schedule_follow_up(&mut self) {
        if self.pipeline.is_playing() {
            debug!("Follow up once playback finishes");
            self.follow_on = true;
        } else {
            info!("Following up");
            self.assist(None);
        }
    }

    fn execute_command(&mut self, command: &CommandDescriptor) {
        if !self.interceptor.run(command) {
            self.report_command_failure(command);
        }
        self.emit_ready();
    }

    fn report_command_failure(&mut self, command: &CommandDescriptor) {
        self.report(SessionError::command_failed(format!(
            "Command '{}' did not complete",
            command.name
        )));
    }

    fn shutdown(&mut self) {
        info!("Session shutting down");
        self.scheduled.clear();
        self.stop_conversation(true);
        self.conversation = None;
        self.hub.emit(Notification::Shutdown);
    }

    fn emit_ready(&mut self) {
        self.set_state(SessionState::Ready);
        self.hub.emit(Notification::Ready);
    }

    fn report(&self, error: SessionError) {
        self.hub.emit(Notification::Error(error));
    }

    fn set_state(&mut self, state: SessionState) {
        if !state.is_listening() {
            self.pipeline.set_listening(false);
        }
        if self.state != state {
            debug!("State {} -> {}", self.state, state);
            self.state = state;
            self.hub.emit(Notification::StateChanged(state));
        }
    }

    fn publish(&self) {
        self.shared.publish(self.snapshot());
    }
}
