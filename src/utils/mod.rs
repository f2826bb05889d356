pub mod channels;

pub use channels::{Mailbox, NotificationHub};
