use crate::messages::Notification;
use crate::session::{EventSender, Input};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// The session mailbox
///
/// Created before the collaborators so devices can be handed a sender, then
/// given to the orchestrator which owns the receiving end.
pub struct Mailbox {
    tx: EventSender,
    rx: Receiver<Input>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx: EventSender::new(tx),
            rx,
        }
    }

    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }

    pub fn into_parts(self) -> (EventSender, Receiver<Input>) {
        (self.tx, self.rx)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Fan-out of notifications to any number of subscribers
///
/// Emission never blocks: each subscriber gets an unbounded channel, and
/// subscribers whose receiver was dropped are pruned on the next emit.
#[derive(Clone, Default)]
pub struct NotificationHub {
    subscribers: Arc<Mutex<Vec<Sender<Notification>>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<Notification> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn emit(&self, notification: Notification) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
