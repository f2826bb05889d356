//! Audio wiring between the devices and the active conversation

use crate::audio::{Microphone, MicrophoneEvent, Player, PlayerEvent};
use crate::session::conversation::ConversationSession;
use tracing::{debug, info, warn};

/// Owns the microphone and player on behalf of the session core
pub struct AudioPipeline {
    microphone: Box<dyn Microphone>,
    player: Box<dyn Player>,
}

impl AudioPipeline {
    pub fn new(microphone: Box<dyn Microphone>, player: Box<dyn Player>) -> Self {
        Self { microphone, player }
    }

    /// Write captured audio to the conversation, if one is live
    ///
    /// Returns whether the audio was delivered. Audio with no live
    /// conversation to receive it is dropped.
    pub fn forward_microphone(
        &mut self,
        audio: &[u8],
        conversation: Option<&mut ConversationSession>,
    ) -> bool {
        let Some(conversation) = conversation.filter(|c| c.is_live()) else {
            debug!("No live conversation, dropping {} bytes of audio", audio.len());
            return false;
        };

        match conversation.write(audio) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write audio to conversation {}: {}", conversation.id(), e);
                false
            }
        }
    }

    /// Queue response audio without waiting for playback
    pub fn play_response(&mut self, audio: &[u8]) {
        self.player.append_buffer(audio);
    }

    /// Open or close the capture gate
    pub fn set_listening(&mut self, enabled: bool) {
        if self.microphone.is_enabled() != enabled {
            debug!("Microphone {}", if enabled { "enabled" } else { "disabled" });
            self.microphone.set_enabled(enabled);
        }
    }

    /// Drop buffered response audio
    pub fn discard_playback(&mut self) {
        self.player.reset();
    }

    /// Let buffered response audio play out
    pub fn drain_playback(&mut self) {
        self.player.play();
    }

    pub fn ping(&mut self) {
        self.player.play_ping();
    }

    pub fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    pub fn buffered_len(&self) -> usize {
        self.player.buffered_len()
    }

    pub fn microphone_enabled(&self) -> bool {
        self.microphone.is_enabled()
    }

    /// Handle a microphone event
    pub fn on_microphone_event(
        &mut self,
        event: MicrophoneEvent,
        conversation: Option<&mut ConversationSession>,
    ) {
        match event {
            MicrophoneEvent::Data(audio) => {
                self.forward_microphone(&audio, conversation);
            }
            MicrophoneEvent::Ready => info!("Microphone ready"),
        }
    }

    /// Handle a player event
    ///
    /// Returns true when a follow-up turn is due: the player finished while
    /// `follow_on` was set. The flag is cleared before returning.
    pub fn on_player_event(&mut self, event: PlayerEvent, follow_on: &mut bool) -> bool {
        match event {
            PlayerEvent::Ready => {
                info!("Audio player ready");
                false
            }
            PlayerEvent::FinishedTalking => {
                debug!("Assistant audio finished");
                if *follow_on {
                    info!("Follow on required");
                    *follow_on = false;
                    true
                } else {
                    false
                }
            }
        }
    }
}
