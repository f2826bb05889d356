pub mod types;

pub use types::{
    Notification, ScreenData, ScreenFormat, SessionError, SessionErrorKind, Transcription,
};
