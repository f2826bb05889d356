//! Loopback assistant service
//!
//! Answers text queries by echoing them back and ends voice turns once half
//! a second of audio has been written. Useful for running a session without
//! network access.

use crate::audio::encode_linear16;
use crate::audio::ping::tone;
use crate::integration::config::AuthConfig;
use crate::messages::{ScreenData, Transcription};
use crate::service::{
    AssistantClient, AssistantConnector, Conversation, ConversationEvent, ConversationId,
    ServiceEvent, StartRequest,
};
use crate::session::EventSender;
use crate::{ParleyError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// Connector for the loopback service
#[derive(Debug, Clone, Default)]
pub struct EchoConnector;

impl EchoConnector {
    pub fn new() -> Self {
        Self
    }
}

impl AssistantConnector for EchoConnector {
    fn connect(&self, _auth: &AuthConfig, events: EventSender) -> Result<Box<dyn AssistantClient>> {
        info!("Connected to echo assistant");
        events.service(ServiceEvent::Ready)?;
        Ok(Box::new(EchoClient { events }))
    }
}

pub struct EchoClient {
    events: EventSender,
}

impl AssistantClient for EchoClient {
    fn start(&mut self, request: StartRequest) -> Result<()> {
        let id = request.id;
        let reply = Reply {
            id,
            events: self.events.clone(),
            ended: Arc::new(AtomicBool::new(false)),
            sample_rate: request.audio.sample_rate_out,
        };

        // Half a second of 16-bit mono audio
        let utterance_bytes = request.audio.sample_rate_in as usize;
        let conversation = EchoConversation {
            reply: reply.clone(),
            written: 0,
            utterance_bytes,
            stopped: false,
        };
        self.events.service(ServiceEvent::Started {
            id,
            conversation: Box::new(conversation),
        })?;

        if let Some(query) = request.text_query {
            thread::Builder::new()
                .name(format!("parley-echo-{}", id.get()))
                .spawn(move || reply.answer(&query))
                .map_err(|e| {
                    ParleyError::TransportError(format!("Failed to spawn echo reply: {}", e))
                })?;
        }
        Ok(())
    }
}

/// Posts one conversation's reply into the session mailbox
#[derive(Clone)]
struct Reply {
    id: ConversationId,
    events: EventSender,
    ended: Arc<AtomicBool>,
    sample_rate: u32,
}

impl Reply {
    fn answer(&self, heard: &str) {
        let text = format!("You said: {}", heard);
        let events = [
            ConversationEvent::Transcription(Transcription::new(heard, true)),
            ConversationEvent::Response(text.clone()),
            ConversationEvent::ScreenData(ScreenData::html(format!("<p>{}</p>", text))),
            ConversationEvent::AudioData(encode_linear16(&tone(440.0, 300, self.sample_rate))),
        ];
        for event in events {
            if self.ended.load(Ordering::SeqCst) {
                return;
            }
            let _ = self.events.conversation(self.id, event);
        }
        self.end();
    }

    /// Post `Ended` the first time only
    fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            let _ = self.events.conversation(
                self.id,
                ConversationEvent::Ended {
                    error: None,
                    follow_up: false,
                },
            );
        }
    }
}

struct EchoConversation {
    reply: Reply,
    written: usize,
    utterance_bytes: usize,
    stopped: bool,
}

impl Conversation for EchoConversation {
    fn write(&mut self, audio: &[u8]) -> Result<()> {
        if self.stopped {
            return Err(ParleyError::TransportError(
                "Conversation already stopped".into(),
            ));
        }

        let before = self.written;
        self.written += audio.len();
        if before < self.utterance_bytes && self.written >= self.utterance_bytes {
            debug!("Echo heard {} bytes, ending utterance", self.written);
            let _ = self
                .reply
                .events
                .conversation(self.reply.id, ConversationEvent::EndOfUtterance);
            let seconds = self.written as f32 / (self.utterance_bytes * 2) as f32;
            let heard = format!("{:.1} seconds of audio", seconds);
            self.reply.answer(&heard);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.reply.end();
        }
    }
}
