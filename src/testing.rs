//! Recording mock collaborators for driving a session in tests
//!
//! `MockService` is a handle over shared state: hand its connector to the
//! session and keep the service itself to inspect what the session did and
//! to post conversation events.

use crate::integration::config::AuthConfig;
use crate::service::{
    AssistantClient, AssistantConnector, Conversation, ConversationEvent, ConversationId,
    ServiceEvent, StartRequest,
};
use crate::session::EventSender;
use crate::{ParleyError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct ServiceLog {
    events: Option<EventSender>,
    connects: usize,
    starts: Vec<StartRequest>,
    writes: HashMap<ConversationId, Vec<Vec<u8>>>,
    stops: HashMap<ConversationId, usize>,
    /// Post `Started` as soon as `start` is called
    auto_start: bool,
    fail_start: bool,
    fail_connect: bool,
}

/// Scriptable stand-in for the assistant service
#[derive(Clone)]
pub struct MockService {
    log: Arc<Mutex<ServiceLog>>,
}

impl MockService {
    pub fn new() -> Self {
        let log = ServiceLog {
            auto_start: true,
            ..Default::default()
        };
        Self {
            log: Arc::new(Mutex::new(log)),
        }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            log: Arc::clone(&self.log),
        }
    }

    pub fn set_auto_start(&self, enabled: bool) {
        self.log.lock().auto_start = enabled;
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.log.lock().fail_start = fail;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.log.lock().fail_connect = fail;
    }

    pub fn connects(&self) -> usize {
        self.log.lock().connects
    }

    /// Every start request received, oldest first
    pub fn starts(&self) -> Vec<StartRequest> {
        self.log.lock().starts.clone()
    }

    pub fn writes(&self, id: ConversationId) -> Vec<Vec<u8>> {
        self.log.lock().writes.get(&id).cloned().unwrap_or_default()
    }

    pub fn stops(&self, id: ConversationId) -> usize {
        self.log.lock().stops.get(&id).copied().unwrap_or(0)
    }

    /// Post `Started` for a request made while auto start was off
    pub fn complete_start(&self, id: ConversationId) {
        let conversation = MockConversation {
            id,
            log: Arc::clone(&self.log),
        };
        self.post(|events| events.service(ServiceEvent::Started {
            id,
            conversation: Box::new(conversation),
        }));
    }

    /// Post a conversation event as the service would
    pub fn emit(&self, id: ConversationId, event: ConversationEvent) {
        self.post(|events| events.conversation(id, event));
    }

    /// Post a service-level error
    pub fn fail(&self, message: &str) {
        self.post(|events| events.service(ServiceEvent::Error(message.to_string())));
    }

    fn post<F>(&self, send: F)
    where
        F: FnOnce(&EventSender) -> Result<()>,
    {
        let events = self.log.lock().events.clone();
        if let Some(events) = events {
            let _ = send(&events);
        }
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockConnector {
    log: Arc<Mutex<ServiceLog>>,
}

impl AssistantConnector for MockConnector {
    fn connect(&self, _auth: &AuthConfig, events: EventSender) -> Result<Box<dyn AssistantClient>> {
        let mut log = self.log.lock();
        log.connects += 1;
        if log.fail_connect {
            return Err(ParleyError::NotAuthenticated);
        }

        events.service(ServiceEvent::Ready)?;
        log.events = Some(events);
        Ok(Box::new(MockClient {
            log: Arc::clone(&self.log),
        }))
    }
}

pub struct MockClient {
    log: Arc<Mutex<ServiceLog>>,
}

impl AssistantClient for MockClient {
    fn start(&mut self, request: StartRequest) -> Result<()> {
        let mut log = self.log.lock();
        if log.fail_start {
            return Err(ParleyError::TransportError("start refused".into()));
        }

        let id = request.id;
        log.starts.push(request);
        if log.auto_start {
            if let Some(events) = &log.events {
                events.service(ServiceEvent::Started {
                    id,
                    conversation: Box::new(MockConversation {
                        id,
                        log: Arc::clone(&self.log),
                    }),
                })?;
            }
        }
        Ok(())
    }
}

pub struct MockConversation {
    id: ConversationId,
    log: Arc<Mutex<ServiceLog>>,
}

impl Conversation for MockConversation {
    fn write(&mut self, audio: &[u8]) -> Result<()> {
        self.log
            .lock()
            .writes
            .entry(self.id)
            .or_default()
            .push(audio.to_vec());
        Ok(())
    }

    fn stop(&mut self) {
        *self.log.lock().stops.entry(self.id).or_insert(0) += 1;
    }
}
