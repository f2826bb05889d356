use crate::audio::ping::ping_samples;
use crate::audio::{Linear16Decoder, Player, PlayerEvent, SampleQueue};
use crate::integration::config::SessionConfig;
use crate::session::EventSender;
use crate::{ParleyError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Seconds of response audio the player can hold
const BUFFER_SECONDS: usize = 120;

#[derive(Clone)]
struct PlaybackShared {
    response: SampleQueue,
    ping: SampleQueue,
    playing: Arc<AtomicBool>,
}

/// Default output device playing assistant responses
pub struct CpalPlayer {
    shared: PlaybackShared,
    decoder: Linear16Decoder,
    ping_samples: Vec<f32>,
    device_name: String,
    shutdown_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CpalPlayer {
    /// Open the default output device at the service's output sample rate
    pub fn open(config: &SessionConfig, events: EventSender) -> Result<Self> {
        let sample_rate = config.audio.sample_rate_out;
        let ping_samples = ping_samples(config.ping_sound.as_deref(), sample_rate)?;

        let capacity = sample_rate as usize * BUFFER_SECONDS;
        let shared = PlaybackShared {
            response: SampleQueue::new(capacity),
            ping: SampleQueue::new(ping_samples.len().max(1) * 4),
            playing: Arc::new(AtomicBool::new(false)),
        };

        let (ready_tx, ready_rx) = bounded::<Result<String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let callback_shared = shared.clone();

        let worker = thread::Builder::new()
            .name("parley-player".to_string())
            .spawn(move || {
                let stream = match build_stream(sample_rate, callback_shared, events.clone()) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = events.player(PlayerEvent::Ready);

                let _ = shutdown_rx.recv();
                drop(stream);
                info!("Stopped audio playback");
            })
            .map_err(|e| {
                ParleyError::AudioDeviceError(format!("Failed to spawn playback thread: {}", e))
            })?;

        let device_name = ready_rx.recv().map_err(|e| {
            ParleyError::ChannelError(format!("Playback thread exited early: {}", e))
        })??;

        Ok(Self {
            shared,
            decoder: Linear16Decoder::new(),
            ping_samples,
            device_name,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn build_stream(
    sample_rate: u32,
    shared: PlaybackShared,
    events: EventSender,
) -> Result<(Stream, String)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| ParleyError::AudioDeviceError("No output device available".into()))?;

    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using output device: {}", name);

    let default_config = device
        .default_output_config()
        .map_err(|e| ParleyError::AudioDeviceError(format!("Failed to get output config: {}", e)))?;

    let channels = default_config.channels() as usize;
    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    };

    let err_fn = |err| {
        error!("Audio output stream error: {}", err);
    };

    let mut response: Vec<f32> = Vec::new();
    let mut ping: Vec<f32> = Vec::new();

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                response.clear();
                response.resize(frames, 0.0);
                ping.clear();
                ping.resize(frames, 0.0);

                let playing = shared.playing.load(Ordering::SeqCst);
                if playing {
                    shared.response.pop_into(&mut response);
                }
                shared.ping.pop_into(&mut ping);

                for (i, frame) in data.chunks_exact_mut(channels).enumerate() {
                    let sample = (response[i] + ping[i]).clamp(-1.0, 1.0);
                    frame.fill(sample);
                }

                // Report the end of a response exactly once
                if playing
                    && shared.response.is_empty()
                    && shared.playing.swap(false, Ordering::SeqCst)
                {
                    let _ = events.player(PlayerEvent::FinishedTalking);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| ParleyError::AudioDeviceError(format!("Failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| ParleyError::AudioDeviceError(format!("Failed to start output stream: {}", e)))?;

    info!("Started audio playback at {} Hz", sample_rate);
    Ok((stream, name))
}

impl Player for CpalPlayer {
    fn append_buffer(&mut self, audio: &[u8]) {
        let samples = self.decoder.decode(audio);
        let accepted = self.shared.response.push(&samples);
        if accepted < samples.len() {
            warn!(
                "Playback buffer full, dropped {} samples",
                samples.len() - accepted
            );
        }
        self.shared.playing.store(true, Ordering::SeqCst);
    }

    fn play(&mut self) {
        let has_audio = !self.shared.response.is_empty();
        self.shared.playing.store(has_audio, Ordering::SeqCst);
    }

    fn reset(&mut self) {
        self.shared.playing.store(false, Ordering::SeqCst);
        self.shared.response.clear();
        self.decoder.reset();
    }

    fn play_ping(&mut self) {
        self.shared.ping.push(&self.ping_samples);
    }

    fn buffered_len(&self) -> usize {
        self.shared.response.len() * 2
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }
}

impl Drop for CpalPlayer {
    fn drop(&mut self) {
        self.reset();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
