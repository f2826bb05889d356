//! In-process audio devices
//!
//! Both devices are cheap handles over shared state: keep one clone to feed
//! or drain audio from outside while the session owns the other.

use crate::audio::{Microphone, MicrophoneEvent, Player, PlayerEvent};
use crate::session::EventSender;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct MicrophoneState {
    enabled: bool,
    /// Every value passed to set_enabled, in order
    history: Vec<bool>,
}

/// Microphone fed programmatically
#[derive(Clone)]
pub struct MemoryMicrophone {
    state: Arc<Mutex<MicrophoneState>>,
    events: Option<EventSender>,
}

impl MemoryMicrophone {
    /// Create a microphone; when `events` is given it reports ready right away
    pub fn new(events: Option<EventSender>) -> Self {
        if let Some(events) = &events {
            let _ = events.microphone(MicrophoneEvent::Ready);
        }
        Self {
            state: Arc::new(Mutex::new(MicrophoneState::default())),
            events,
        }
    }

    /// Deliver captured audio; dropped unless the capture gate is open
    pub fn feed(&self, audio: &[u8]) -> bool {
        if !self.state.lock().enabled {
            debug!("Microphone disabled, dropping {} bytes", audio.len());
            return false;
        }
        match &self.events {
            Some(events) => events
                .microphone(MicrophoneEvent::Data(audio.to_vec()))
                .is_ok(),
            None => false,
        }
    }

    pub fn enabled_history(&self) -> Vec<bool> {
        self.state.lock().history.clone()
    }
}

impl Microphone for MemoryMicrophone {
    fn set_enabled(&mut self, enabled: bool) {
        let mut state = self.state.lock();
        state.enabled = enabled;
        state.history.push(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }
}

#[derive(Debug, Default)]
struct PlayerState {
    buffer: Vec<u8>,
    /// Appended chunks in arrival order
    chunks: Vec<Vec<u8>>,
    playing: bool,
    play_calls: usize,
    resets: usize,
    pings: usize,
}

/// Player that buffers audio in memory until drained
#[derive(Clone)]
pub struct MemoryPlayer {
    state: Arc<Mutex<PlayerState>>,
    events: Option<EventSender>,
}

impl MemoryPlayer {
    /// Create a player; when `events` is given it reports ready right away
    pub fn new(events: Option<EventSender>) -> Self {
        if let Some(events) = &events {
            let _ = events.player(PlayerEvent::Ready);
        }
        Self {
            state: Arc::new(Mutex::new(PlayerState::default())),
            events,
        }
    }

    /// Simulate playback reaching the end of the buffer
    ///
    /// Returns the number of bytes "played". Reports `FinishedTalking` if
    /// the player was playing.
    pub fn finish_playback(&self) -> usize {
        let (played, was_playing) = {
            let mut state = self.state.lock();
            let played = state.buffer.len();
            let was_playing = state.playing;
            state.buffer.clear();
            state.playing = false;
            (played, was_playing)
        };

        if was_playing {
            if let Some(events) = &self.events {
                let _ = events.player(PlayerEvent::FinishedTalking);
            }
        }
        played
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.state.lock().chunks.clone()
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    pub fn resets(&self) -> usize {
        self.state.lock().resets
    }

    pub fn pings(&self) -> usize {
        self.state.lock().pings
    }
}

impl Player for MemoryPlayer {
    fn append_buffer(&mut self, audio: &[u8]) {
        let mut state = self.state.lock();
        state.buffer.extend_from_slice(audio);
        state.chunks.push(audio.to_vec());
        state.playing = true;
    }

    fn play(&mut self) {
        let mut state = self.state.lock();
        state.play_calls += 1;
        state.playing = !state.buffer.is_empty();
    }

    fn reset(&mut self) {
        let mut state = self.state.lock();
        state.buffer.clear();
        state.playing = false;
        state.resets += 1;
    }

    fn play_ping(&mut self) {
        self.state.lock().pings += 1;
    }

    fn buffered_len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Input;
    use crate::utils::Mailbox;

    #[test]
    fn test_microphone_feeds_only_when_enabled() {
        let mailbox = Mailbox::new();
        let mut mic = MemoryMicrophone::new(Some(mailbox.sender()));
        let (_, rx) = mailbox.into_parts();
        assert!(matches!(
            rx.try_recv().unwrap(),
            Input::Microphone(MicrophoneEvent::Ready)
        ));

        assert!(!mic.feed(&[1, 2]));
        mic.set_enabled(true);
        assert!(mic.feed(&[3, 4]));

        match rx.try_recv().unwrap() {
            Input::Microphone(MicrophoneEvent::Data(bytes)) => assert_eq!(bytes, vec![3, 4]),
            other => panic!("Expected microphone data, got {:?}", other),
        }
        assert_eq!(mic.enabled_history(), vec![true]);
    }

    #[test]
    fn test_player_reset_discards_buffer() {
        let mut player = MemoryPlayer::new(None);
        player.append_buffer(&[1, 2, 3]);
        player.append_buffer(&[4]);
        assert_eq!(player.buffered_len(), 4);
        assert!(player.is_playing());

        player.reset();
        assert_eq!(player.buffered_len(), 0);
        assert!(!player.is_playing());
        assert_eq!(player.resets(), 1);
        assert_eq!(player.chunks().len(), 2);
    }

    #[test]
    fn test_finish_playback_reports_once() {
        let mailbox = Mailbox::new();
        let mut player = MemoryPlayer::new(Some(mailbox.sender()));
        let (_, rx) = mailbox.into_parts();
        let _ready = rx.try_recv().unwrap();

        player.append_buffer(&[0; 10]);
        assert_eq!(player.finish_playback(), 10);
        assert_eq!(player.finish_playback(), 0);

        assert!(matches!(
            rx.try_recv().unwrap(),
            Input::Player(PlayerEvent::FinishedTalking)
        ));
        assert!(rx.try_recv().is_err());
    }
}
