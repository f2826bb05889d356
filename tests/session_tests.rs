//! End-to-end session tests
//!
//! These drive the threaded orchestrator with the recording mock service and
//! in-memory audio devices, and observe it only through notifications, the
//! published state snapshot and what the mocks recorded.

use crossbeam_channel::Receiver;
use parley::audio::{MemoryMicrophone, MemoryPlayer, Player};
use parley::commands::CommandTable;
use parley::integration::{OrchestratorBuilder, SessionConfig, SessionHandle};
use parley::messages::{Notification, SessionErrorKind};
use parley::service::{ConversationEvent, ConversationId};
use parley::session::SessionState;
use parley::testing::MockService;
use parley::utils::Mailbox;
use parley::ParleyError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(2);

/// A running session with handles on every collaborator
struct TestSession {
    handle: SessionHandle,
    notifications: Receiver<Notification>,
    service: MockService,
    microphone: MemoryMicrophone,
    player: MemoryPlayer,
    lights: Arc<AtomicUsize>,
    worker: Option<JoinHandle<()>>,
}

impl TestSession {
    fn new() -> Self {
        Self::with_commands(|table| table)
    }

    fn with_commands(extra: impl FnOnce(CommandTable) -> CommandTable) -> Self {
        let mailbox = Mailbox::new();
        let service = MockService::new();
        let microphone = MemoryMicrophone::new(Some(mailbox.sender()));
        let player = MemoryPlayer::new(Some(mailbox.sender()));
        let lights = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&lights);
        let commands = extra(CommandTable::new().with_command(
            "lights_on",
            &["turn on the lights", "lights on"],
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            },
        ));

        let (orchestrator, handle) = OrchestratorBuilder::new()
            .with_config(SessionConfig::default())
            .with_connector(service.connector())
            .with_microphone(microphone.clone())
            .with_player(player.clone())
            .with_commands(commands)
            .build(mailbox)
            .unwrap();
        let notifications = handle.subscribe();
        let worker = orchestrator.start().unwrap();

        let session = Self {
            handle,
            notifications,
            service,
            microphone,
            player,
            lights,
            worker: Some(worker),
        };
        session.handle.authenticate().unwrap();
        session.wait_for(|n| *n == Notification::Ready);
        session
    }

    /// Wait until every input posted so far, and everything those inputs
    /// posted in turn, has been handled
    fn sync(&self) {
        for _ in 0..2 {
            assert!(!self.handle.run_command("synchronize", false).unwrap());
        }
    }

    /// Collect notifications up to and including the first match
    fn wait_for(&self, matches: impl Fn(&Notification) -> bool) -> Vec<Notification> {
        let mut seen = Vec::new();
        loop {
            let notification = self
                .notifications
                .recv_timeout(TIMEOUT)
                .unwrap_or_else(|_| panic!("Timed out; saw {:?}", seen));
            let done = matches(&notification);
            seen.push(notification);
            if done {
                return seen;
            }
        }
    }

    fn drain(&self) -> Vec<Notification> {
        self.notifications.try_iter().collect()
    }

    fn lifecycle(&self) -> Vec<Notification> {
        self.drain().into_iter().filter(|n| n.is_lifecycle()).collect()
    }

    /// Start a voice turn and return its conversation id
    fn start_voice_turn(&self) -> ConversationId {
        self.handle.assist(None).unwrap();
        self.wait_for(|n| *n == Notification::Listening);
        self.sync();
        self.handle.state().active_conversation.unwrap()
    }

    fn emit(&self, id: ConversationId, event: ConversationEvent) {
        self.service.emit(id, event);
        self.sync();
    }

    fn ended(&self, id: ConversationId, follow_up: bool) {
        self.emit(
            id,
            ConversationEvent::Ended {
                error: None,
                follow_up,
            },
        );
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        let _ = self.handle.shutdown();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[test]
fn test_command_query_short_circuits_service() {
    let session = TestSession::new();

    session.handle.assist(Some("turn on the lights")).unwrap();
    let seen = session.wait_for(|n| *n == Notification::Ready);
    session.sync();

    assert!(seen.contains(&Notification::Waiting));
    assert!(session.service.starts().is_empty());
    assert_eq!(session.lights.load(Ordering::SeqCst), 1);
}

#[test]
fn test_voice_turn_notifies_loading_then_listening() {
    let session = TestSession::new();
    session.start_voice_turn();

    let starts = session.service.starts();
    assert_eq!(starts.len(), 1);
    assert!(starts[0].text_query.is_none());

    let state = session.handle.state();
    assert_eq!(state.state, SessionState::Listening);
    assert!(state.microphone_enabled);
}

#[test]
fn test_unmatched_query_goes_to_service_as_text() {
    let session = TestSession::new();

    session.handle.assist(Some("what's the weather")).unwrap();
    session.sync();

    let starts = session.service.starts();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].text_query.as_deref(), Some("what's the weather"));

    let state = session.handle.state();
    assert!(state.active_conversation.is_some());
    assert!(!state.microphone_enabled);
    assert_eq!(session.lifecycle(), vec![Notification::Waiting]);
}

#[test]
fn test_microphone_audio_reaches_conversation_until_end_of_utterance() {
    let session = TestSession::new();
    let id = session.start_voice_turn();

    assert!(session.microphone.feed(&[1, 2, 3, 4]));
    session.sync();
    assert_eq!(session.service.writes(id), vec![vec![1, 2, 3, 4]]);

    session.emit(id, ConversationEvent::EndOfUtterance);
    let state = session.handle.state();
    assert_eq!(state.state, SessionState::Waiting);
    assert!(!state.microphone_enabled);
    assert!(!session.microphone.feed(&[5, 6]));
}

#[test]
fn test_response_audio_appended_in_order() {
    let session = TestSession::new();
    let id = session.start_voice_turn();

    for chunk in [vec![1, 1], vec![2, 2], vec![3, 3]] {
        session.service.emit(id, ConversationEvent::AudioData(chunk));
    }
    session.sync();

    assert_eq!(
        session.player.chunks(),
        vec![vec![1, 1], vec![2, 2], vec![3, 3]]
    );
    assert_eq!(session.handle.state().state, SessionState::Responding);
}

#[test]
fn test_html_screen_data_rendered() {
    let session = TestSession::new();
    let id = session.start_voice_turn();

    session.emit(
        id,
        ConversationEvent::ScreenData(parley::messages::ScreenData::html("<h1>Sunny</h1>")),
    );
    let seen = session.wait_for(|n| matches!(n, Notification::ResponseHtml(_)));
    assert_eq!(
        seen.last(),
        Some(&Notification::ResponseHtml("<h1>Sunny</h1>".to_string()))
    );
}

#[test]
fn test_at_most_one_active_conversation() {
    let session = TestSession::new();

    for _ in 0..5 {
        session.handle.assist(None).unwrap();
    }
    session.sync();

    let starts = session.service.starts();
    assert_eq!(starts.len(), 5);
    let newest = starts.last().unwrap().id;
    assert_eq!(session.handle.state().active_conversation, Some(newest));

    // Every older stream was stopped as it arrived
    for start in &starts[..4] {
        assert_eq!(session.service.stops(start.id), 1);
    }
}

#[test]
fn test_follow_up_restarts_voice_turn() {
    let session = TestSession::new();
    let id = session.start_voice_turn();
    session.drain();

    session.ended(id, true);
    session.sync();

    let starts = session.service.starts();
    assert_eq!(starts.len(), 2);
    assert!(starts[1].text_query.is_none());
    assert_eq!(
        session.lifecycle(),
        vec![
            Notification::Ready,
            Notification::Loading,
            Notification::Listening
        ]
    );
}

#[test]
fn test_follow_on_fires_once_after_playback() {
    let session = TestSession::new();
    let id = session.start_voice_turn();

    session.emit(id, ConversationEvent::AudioData(vec![0; 64]));
    session.ended(id, true);
    assert!(session.handle.state().follow_on);
    assert_eq!(session.service.starts().len(), 1);

    session.player.finish_playback();
    session.sync();
    assert!(!session.handle.state().follow_on);
    assert_eq!(session.service.starts().len(), 2);

    // A second finish has nothing left to follow
    session.player.finish_playback();
    session.sync();
    assert_eq!(session.service.starts().len(), 2);
}

#[test]
fn test_queued_command_runs_once_after_ended() {
    let session = TestSession::new();
    let id = session.start_voice_turn();
    session.drain();

    assert!(session.handle.run_command("lights on", true).unwrap());
    assert_eq!(session.lights.load(Ordering::SeqCst), 0);
    assert!(session.handle.state().pending_command);
    assert_eq!(session.service.stops(id), 1);

    session.ended(id, false);
    session.ended(id, false);
    session.ended(id, true);

    assert_eq!(session.lights.load(Ordering::SeqCst), 1);
    assert!(!session.handle.state().pending_command);
    assert_eq!(session.lifecycle(), vec![Notification::Ready]);
    assert_eq!(session.service.starts().len(), 1);
}

#[test]
fn test_force_stop_discards_audio_and_closes_microphone() {
    let session = TestSession::new();
    let id = session.start_voice_turn();
    session.emit(id, ConversationEvent::AudioData(vec![0; 128]));
    assert_eq!(session.player.buffered_len(), 128);

    session.handle.stop_conversation(true).unwrap();
    session.sync();

    assert_eq!(session.player.buffered_len(), 0);
    let state = session.handle.state();
    assert!(!state.microphone_enabled);
    assert!(state.active_conversation.is_none());
    assert_eq!(state.state, SessionState::Idle);

    // Late audio from the stopped conversation is ignored
    session.emit(id, ConversationEvent::AudioData(vec![0; 16]));
    assert_eq!(session.player.buffered_len(), 0);
}

#[test]
fn test_stale_conversation_events_ignored_after_reset() {
    let session = TestSession::new();
    let first = session.start_voice_turn();

    session.handle.reset().unwrap();
    session.sync();
    let second = session.handle.state().active_conversation.unwrap();
    assert_ne!(first, second);

    session.emit(first, ConversationEvent::Response("old".into()));
    session.ended(first, true);

    assert_eq!(session.handle.state().active_conversation, Some(second));
    assert_eq!(session.service.starts().len(), 2);
    assert!(!session
        .drain()
        .contains(&Notification::Response("old".into())));
}

#[test]
fn test_say_stops_conversation_then_repeats_sentence() {
    let session = TestSession::new();
    let id = session.start_voice_turn();

    session
        .handle
        .say("hello", Duration::from_millis(300), false)
        .unwrap();
    session.sync();
    assert_eq!(session.service.starts().len(), 1);

    session.wait_for(|n| *n == Notification::Waiting);
    session.sync();

    assert_eq!(session.service.stops(id), 1);
    let starts = session.service.starts();
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[1].text_query.as_deref(), Some("repeat after me hello"));
}

#[test]
fn test_silent_say_only_reports_ready() {
    let session = TestSession::new();
    session.drain();

    session.handle.say("hello", Duration::ZERO, true).unwrap();
    session.wait_for(|n| *n == Notification::Ready);
    session.sync();
    assert!(session.service.starts().is_empty());
}

#[test]
fn test_failed_command_reports_error_then_ready() {
    let session = TestSession::with_commands(|table| {
        table.with_command("garage", &["open the garage"], || {
            Err(ParleyError::CommandError("garage offline".into()))
        })
    });

    session.handle.assist(Some("open the garage")).unwrap();
    let seen = session.wait_for(|n| *n == Notification::Ready);

    let error = seen.iter().position(|n| {
        matches!(n, Notification::Error(e) if e.kind == SessionErrorKind::CommandFailed)
    });
    assert!(error.is_some());
    assert!(session.service.starts().is_empty());
}

#[test]
fn test_service_error_unblocks_waiting_caller() {
    let session = TestSession::new();
    session.service.set_auto_start(false);

    session.handle.assist(None).unwrap();
    session.sync();
    session.service.fail("UNAVAILABLE");

    let seen = session.wait_for(|n| *n == Notification::Ready);
    assert!(seen.iter().any(|n| matches!(
        n,
        Notification::Error(e) if e.kind == SessionErrorKind::Transport
    )));
}

#[test]
fn test_ping_does_not_change_state() {
    let session = TestSession::new();
    let before = session.handle.state().state;

    session.handle.play_ping().unwrap();
    session.sync();

    assert_eq!(session.player.pings(), 1);
    assert_eq!(session.handle.state().state, before);
}
