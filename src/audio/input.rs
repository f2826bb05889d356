use crate::audio::{downmix, encode_linear16, Microphone, MicrophoneEvent};
use crate::integration::config::AudioConfig;
use crate::session::EventSender;
use crate::{ParleyError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Default input device gated by the session
///
/// The cpal stream lives on its own thread for its whole life, so this
/// handle can move to the session worker.
pub struct CpalMicrophone {
    enabled: Arc<AtomicBool>,
    device_name: String,
    shutdown_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CpalMicrophone {
    /// Open the default input device at the service's input sample rate
    pub fn open(audio: &AudioConfig, events: EventSender) -> Result<Self> {
        let enabled = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = bounded::<Result<String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let gate = Arc::clone(&enabled);
        let sample_rate = audio.sample_rate_in;

        let worker = thread::Builder::new()
            .name("parley-microphone".to_string())
            .spawn(move || {
                let stream = match build_stream(sample_rate, gate, events.clone()) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = events.microphone(MicrophoneEvent::Ready);

                // Park until the handle is dropped
                let _ = shutdown_rx.recv();
                drop(stream);
                info!("Stopped audio capture");
            })
            .map_err(|e| {
                ParleyError::AudioDeviceError(format!("Failed to spawn capture thread: {}", e))
            })?;

        let device_name = ready_rx.recv().map_err(|e| {
            ParleyError::ChannelError(format!("Capture thread exited early: {}", e))
        })??;

        Ok(Self {
            enabled,
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
    gate: Arc<AtomicBool>,
    events: EventSender,
) -> Result<(Stream, String)> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| ParleyError::AudioDeviceError("No input device available".into()))?;

    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using input device: {}", name);

    let default_config = device
        .default_input_config()
        .map_err(|e| ParleyError::AudioDeviceError(format!("Failed to get input config: {}", e)))?;

    let channels = default_config.channels() as usize;
    let config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    };

    let err_fn = |err| {
        error!("Audio input stream error: {}", err);
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !gate.load(Ordering::SeqCst) {
                    return;
                }

                let samples = downmix(data, channels);
                if let Err(e) = events.microphone(MicrophoneEvent::Data(encode_linear16(&samples)))
                {
                    debug!("Failed to send audio data: {}", e);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| ParleyError::AudioDeviceError(format!("Failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| ParleyError::AudioDeviceError(format!("Failed to start input stream: {}", e)))?;

    info!("Started audio capture at {} Hz", sample_rate);
    Ok((stream, name))
}

impl Microphone for CpalMicrophone {
    fn set_enabled(&mut self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
