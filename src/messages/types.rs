use crate::session::SessionState;
use serde::Serialize;

/// Markup format of a `screen-data` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScreenFormat {
    Html,
    Other(String),
}

impl ScreenFormat {
    /// Parse the format name reported by the service
    pub fn parse(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("html") {
            ScreenFormat::Html
        } else {
            ScreenFormat::Other(name.to_string())
        }
    }
}

impl std::fmt::Display for ScreenFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScreenFormat::Html => write!(f, "HTML"),
            ScreenFormat::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Visual response payload streamed alongside the audio answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenData {
    pub format: ScreenFormat,
    pub data: Vec<u8>,
}

impl ScreenData {
    pub fn new(format: ScreenFormat, data: Vec<u8>) -> Self {
        Self { format, data }
    }

    pub fn html(markup: impl Into<String>) -> Self {
        Self::new(ScreenFormat::Html, markup.into().into_bytes())
    }

    /// Renderable markup, or None when the format is unsupported
    pub fn markup(&self) -> Option<String> {
        match self.format {
            ScreenFormat::Html => Some(String::from_utf8_lossy(&self.data).into_owned()),
            ScreenFormat::Other(_) => None,
        }
    }
}

/// Partial or final transcript of what the user said
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcription {
    pub text: String,
    pub done: bool,
}

impl Transcription {
    pub fn new(text: impl Into<String>, done: bool) -> Self {
        Self {
            text: text.into(),
            done,
        }
    }
}

/// Classification of non-fatal failures surfaced to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionErrorKind {
    /// The assistant service or a conversation reported an error
    Transport,
    /// A `screen-data` payload had a format we cannot render
    UnsupportedPayload,
    /// A local command failed or reported an unsuccessful run
    CommandFailed,
    /// A conversation was requested before `authenticate()` succeeded
    NotAuthenticated,
    /// A microphone or player operation failed
    Device,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Transport, message)
    }

    pub fn unsupported_payload(message: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::UnsupportedPayload, message)
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::CommandFailed, message)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Advisory notifications emitted by the session
///
/// Any number of listeners may subscribe; none is required.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Notification {
    Ready,
    Listening,
    Waiting,
    Loading,
    ResponseHtml(String),
    DeviceAction(serde_json::Value),
    Transcription(Transcription),
    Response(String),
    StateChanged(SessionState),
    Error(SessionError),
    Shutdown,
}

impl Notification {
    /// Check if this is one of the lifecycle notifications UIs react to
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Notification::Ready
                | Notification::Listening
                | Notification::Waiting
                | Notification::Loading
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_format_parse() {
        assert_eq!(ScreenFormat::parse("HTML"), ScreenFormat::Html);
        assert_eq!(ScreenFormat::parse("html"), ScreenFormat::Html);
        assert_eq!(
            ScreenFormat::parse("JSON"),
            ScreenFormat::Other("JSON".to_string())
        );
    }

    #[test]
    fn test_screen_data_markup() {
        let html = ScreenData::html("<p>sunny</p>");
        assert_eq!(html.markup().as_deref(), Some("<p>sunny</p>"));

        let other = ScreenData::new(ScreenFormat::parse("PNG"), vec![0x89, 0x50]);
        assert!(other.markup().is_none());
    }

    #[test]
    fn test_lifecycle_notifications() {
        assert!(Notification::Ready.is_lifecycle());
        assert!(Notification::Loading.is_lifecycle());
        assert!(!Notification::Response("hi".into()).is_lifecycle());
        assert!(!Notification::StateChanged(SessionState::Ready).is_lifecycle());
    }

    #[test]
    fn test_notification_json_shape() {
        let json = serde_json::to_string(&Notification::Ready).unwrap();
        assert_eq!(json, r#"{"event":"ready"}"#);

        let json = serde_json::to_string(&Notification::Response("hi".into())).unwrap();
        assert_eq!(json, r#"{"event":"response","data":"hi"}"#);
    }
}
