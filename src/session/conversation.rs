//! One live assistant conversation
//!
//! Wraps the conversation stream and translates its events into actions the
//! session core applies. The session never touches devices itself, which
//! keeps the translation rules testable in isolation.

use crate::commands::PendingCommand;
use crate::messages::{Notification, SessionError};
use crate::service::{Conversation, ConversationEvent, ConversationId};
use crate::Result;
use tracing::{debug, info, warn};

/// Where a conversation is in its teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    /// Streaming in both directions
    Live,
    /// Outbound stream stopped, buffered response audio still plays out
    Draining,
    /// Force-stopped; only the final `Ended` is still honored
    Stopping,
}

/// What the core must do in response to a conversation event
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Queue response audio on the player
    AppendAudio(Vec<u8>),
    /// The user stopped speaking; close the microphone
    EndOfUtterance,
    /// First response content of this turn arrived
    Responding,
    Notify(Notification),
    /// Non-fatal failure to surface to listeners
    Report(SessionError),
    /// The conversation is over
    Ended {
        error: Option<String>,
        follow_up: bool,
    },
}

pub struct ConversationSession {
    id: ConversationId,
    stream: Box<dyn Conversation>,
    text_mode: bool,
    phase: ConversationPhase,
    ended_callback: Option<PendingCommand>,
    responding: bool,
    ended: bool,
}

impl ConversationSession {
    pub fn new(id: ConversationId, stream: Box<dyn Conversation>, text_mode: bool) -> Self {
        Self {
            id,
            stream,
            text_mode,
            phase: ConversationPhase::Live,
            ended_callback: None,
            responding: false,
            ended: false,
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Whether this conversation was started from a text query
    pub fn is_text_mode(&self) -> bool {
        self.text_mode
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn is_live(&self) -> bool {
        self.phase == ConversationPhase::Live
    }

    /// Write microphone audio to the outbound stream
    pub fn write(&mut self, audio: &[u8]) -> Result<()> {
        self.stream.write(audio)
    }

    /// Stop the outbound stream
    ///
    /// The stream is stopped at most once; a later force-stop only moves a
    /// draining conversation to `Stopping`.
    pub fn stop(&mut self, force: bool) {
        if self.phase == ConversationPhase::Live {
            info!("Stopping conversation {}", self.id);
            self.stream.stop();
        }

        self.phase = match (self.phase, force) {
            (_, true) => ConversationPhase::Stopping,
            (ConversationPhase::Stopping, false) => ConversationPhase::Stopping,
            (_, false) => ConversationPhase::Draining,
        };
    }

    /// Attach a command to run when this conversation terminates
    ///
    /// Returns the previously attached command, if any.
    pub fn set_ended_callback(&mut self, pending: PendingCommand) -> Option<PendingCommand> {
        self.ended_callback.replace(pending)
    }

    pub fn has_ended_callback(&self) -> bool {
        self.ended_callback.is_some()
    }

    /// Consume the attached command; yields it at most once
    pub fn take_ended_callback(&mut self) -> Option<PendingCommand> {
        self.ended_callback.take()
    }

    /// Translate one event into actions for the core
    pub fn handle_event(&mut self, event: ConversationEvent) -> Vec<SessionAction> {
        if self.ended {
            debug!("Conversation {} already ended, ignoring {:?}", self.id, event);
            return Vec::new();
        }

        if self.phase == ConversationPhase::Stopping
            && !matches!(event, ConversationEvent::Ended { .. })
        {
            debug!("Conversation {} is stopping, ignoring event", self.id);
            return Vec::new();
        }

        let mut actions = Vec::new();
        match event {
            ConversationEvent::AudioData(audio) => {
                if audio.is_empty() {
                    return actions;
                }
                self.mark_responding(&mut actions);
                actions.push(SessionAction::AppendAudio(audio));
            }
            ConversationEvent::EndOfUtterance => {
                debug!("End of utterance on conversation {}", self.id);
                actions.push(SessionAction::EndOfUtterance);
            }
            ConversationEvent::DeviceAction(action) => {
                info!("Device action: {}", action);
                actions.push(SessionAction::Notify(Notification::DeviceAction(action)));
            }
            ConversationEvent::Transcription(transcription) => {
                debug!(
                    "Transcription: '{}' (done: {})",
                    transcription.text, transcription.done
                );
                actions.push(SessionAction::Notify(Notification::Transcription(
                    transcription,
                )));
            }
            ConversationEvent::Response(text) => {
                debug!("Response: '{}'", text);
                self.mark_responding(&mut actions);
                actions.push(SessionAction::Notify(Notification::Response(text)));
            }
            ConversationEvent::ScreenData(screen) => match screen.markup() {
                Some(html) => {
                    actions.push(SessionAction::Notify(Notification::ResponseHtml(html)));
                }
                None => {
                    warn!(
                        "Dropping screen data in unsupported format {} ({} bytes)",
                        screen.format,
                        screen.data.len()
                    );
                    actions.push(SessionAction::Report(SessionError::unsupported_payload(
                        format!("Unsupported screen data format: {}", screen.format),
                    )));
                }
            },
            ConversationEvent::Ended { error, follow_up } => {
                self.ended = true;
                info!(
                    "Conversation {} ended (follow up: {}, error: {:?})",
                    self.id, follow_up, error
                );
                actions.push(SessionAction::Ended { error, follow_up });
            }
        }
        actions
    }

    fn mark_responding(&mut self, actions: &mut Vec<SessionAction>) {
        if !self.responding {
            self.responding = true;
            actions.push(SessionAction::Responding);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandDescriptor;
    use crate::messages::{ScreenData, ScreenFormat, SessionErrorKind, Transcription};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingStream {
        stops: Arc<AtomicUsize>,
    }

    impl Conversation for CountingStream {
        fn write(&mut self, _audio: &[u8]) -> Result<()> {
            Ok(())
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session() -> (ConversationSession, Arc<AtomicUsize>) {
        let stops = Arc::new(AtomicUsize::new(0));
        let stream = CountingStream {
            stops: Arc::clone(&stops),
        };
        (
            ConversationSession::new(ConversationId::new(1), Box::new(stream), false),
            stops,
        )
    }

    #[test]
    fn test_first_audio_marks_responding_once() {
        let (mut session, _) = session();

        let actions = session.handle_event(ConversationEvent::AudioData(vec![1, 2]));
        assert_eq!(
            actions,
            vec![
                SessionAction::Responding,
                SessionAction::AppendAudio(vec![1, 2])
            ]
        );

        let actions = session.handle_event(ConversationEvent::AudioData(vec![3]));
        assert_eq!(actions, vec![SessionAction::AppendAudio(vec![3])]);
    }

    #[test]
    fn test_informational_events_forwarded() {
        let (mut session, _) = session();

        let actions = session.handle_event(ConversationEvent::Transcription(
            Transcription::new("what's the", false),
        ));
        assert_eq!(
            actions,
            vec![SessionAction::Notify(Notification::Transcription(
                Transcription::new("what's the", false)
            ))]
        );

        let actions = session.handle_event(ConversationEvent::DeviceAction(
            serde_json::json!({"command": "OnOff", "on": true}),
        ));
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::Notify(Notification::DeviceAction(_))]
        ));
    }

    #[test]
    fn test_html_screen_data_rendered() {
        let (mut session, _) = session();
        let actions = session.handle_event(ConversationEvent::ScreenData(ScreenData::html(
            "<b>72°F</b>",
        )));
        assert_eq!(
            actions,
            vec![SessionAction::Notify(Notification::ResponseHtml(
                "<b>72°F</b>".to_string()
            ))]
        );
    }

    #[test]
    fn test_unsupported_screen_data_reported_not_fatal() {
        let (mut session, _) = session();
        let actions = session.handle_event(ConversationEvent::ScreenData(ScreenData::new(
            ScreenFormat::parse("PNG"),
            vec![0x89],
        )));
        match actions.as_slice() {
            [SessionAction::Report(error)] => {
                assert_eq!(error.kind, SessionErrorKind::UnsupportedPayload);
            }
            other => panic!("Expected a report, got {:?}", other),
        }

        // The conversation keeps going
        let actions = session.handle_event(ConversationEvent::Response("ok".into()));
        assert!(!actions.is_empty());
    }

    #[test]
    fn test_events_after_ended_ignored() {
        let (mut session, _) = session();
        let ended = ConversationEvent::Ended {
            error: None,
            follow_up: true,
        };

        assert_eq!(
            session.handle_event(ended.clone()),
            vec![SessionAction::Ended {
                error: None,
                follow_up: true
            }]
        );
        assert!(session.handle_event(ended).is_empty());
        assert!(session
            .handle_event(ConversationEvent::AudioData(vec![1]))
            .is_empty());
    }

    #[test]
    fn test_force_stop_ignores_all_but_ended() {
        let (mut session, stops) = session();
        session.stop(true);
        assert_eq!(session.phase(), ConversationPhase::Stopping);
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        assert!(session
            .handle_event(ConversationEvent::AudioData(vec![1, 2]))
            .is_empty());
        assert!(session
            .handle_event(ConversationEvent::EndOfUtterance)
            .is_empty());

        let actions = session.handle_event(ConversationEvent::Ended {
            error: None,
            follow_up: false,
        });
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_stream_stopped_once() {
        let (mut session, stops) = session();
        session.stop(false);
        assert_eq!(session.phase(), ConversationPhase::Draining);

        // Draining conversations still accept response audio
        assert!(!session
            .handle_event(ConversationEvent::AudioData(vec![1]))
            .is_empty());

        session.stop(true);
        session.stop(false);
        assert_eq!(session.phase(), ConversationPhase::Stopping);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ended_callback_taken_once() {
        let (mut session, _) = session();
        let pending = PendingCommand {
            command: CommandDescriptor::new("lights_on", "turn on the lights"),
            queued: true,
        };

        assert!(session.set_ended_callback(pending.clone()).is_none());
        assert!(session.has_ended_callback());
        assert_eq!(session.take_ended_callback(), Some(pending));
        assert_eq!(session.take_ended_callback(), None);
    }
}
