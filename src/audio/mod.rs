//! Audio collaborators
//!
//! The session drives a microphone and a player through the traits below.
//! Devices report back through the session mailbox with `MicrophoneEvent`
//! and `PlayerEvent`. Audio crosses the seam as LINEAR16 little-endian bytes,
//! the encoding the assistant service speaks.

pub mod buffer;
#[cfg(feature = "audio-io")]
pub mod input;
pub mod memory;
#[cfg(feature = "audio-io")]
pub mod output;
pub mod ping;

pub use buffer::SampleQueue;
#[cfg(feature = "audio-io")]
pub use input::CpalMicrophone;
pub use memory::{MemoryMicrophone, MemoryPlayer};
#[cfg(feature = "audio-io")]
pub use output::CpalPlayer;

/// Audio capture device
pub trait Microphone: Send {
    /// Open or close the capture gate
    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;
}

/// Audio output device
pub trait Player: Send {
    /// Queue response audio; must not block on playback
    fn append_buffer(&mut self, audio: &[u8]);

    /// Play out whatever is buffered
    fn play(&mut self);

    /// Discard buffered audio and stop playing
    fn reset(&mut self);

    /// Play the short acknowledgment tone
    fn play_ping(&mut self);

    /// Bytes of response audio not yet played
    fn buffered_len(&self) -> usize;

    fn is_playing(&self) -> bool;
}

/// Events posted by a microphone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneEvent {
    /// Captured LINEAR16 audio
    Data(Vec<u8>),
    Ready,
}

/// Events posted by a player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready,
    /// Buffered response audio has finished playing
    FinishedTalking,
}

/// Encode f32 samples (-1.0..1.0) as LINEAR16 little-endian bytes
pub fn encode_linear16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode LINEAR16 little-endian bytes into f32 samples
///
/// A trailing odd byte is ignored.
pub fn decode_linear16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / i16::MAX as f32)
        .collect()
}

/// Streaming LINEAR16 decoder
///
/// Chunks may split a sample between them; the dangling byte is held until
/// the next chunk arrives.
#[derive(Debug, Default)]
pub struct Linear16Decoder {
    carry: Option<u8>,
}

impl Linear16Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> Vec<f32> {
        match self.carry.take() {
            Some(first) => {
                let mut joined = Vec::with_capacity(chunk.len() + 1);
                joined.push(first);
                joined.extend_from_slice(chunk);
                self.decode_aligned(&joined)
            }
            None => self.decode_aligned(chunk),
        }
    }

    /// Forget a held byte
    pub fn reset(&mut self) {
        self.carry = None;
    }

    fn decode_aligned(&mut self, bytes: &[u8]) -> Vec<f32> {
        if bytes.len() % 2 == 1 {
            self.carry = bytes.last().copied();
        }
        decode_linear16(bytes)
    }
}

/// Average interleaved frames down to mono
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}
