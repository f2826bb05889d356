//! Parley - spoken-dialogue session coordinator
//!
//! Multiplexes microphone capture into a remote assistant conversation,
//! demultiplexes the assistant's response stream into playback and
//! notifications, intercepts local commands before they reach the remote
//! service, and continues follow-up turns without user re-initiation.

pub mod audio;
pub mod commands;
pub mod integration;
pub mod messages;
pub mod service;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod utils;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ParleyError {
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Assistant client is not authenticated")]
    NotAuthenticated,

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for ParleyError {
    fn from(e: std::io::Error) -> Self {
        ParleyError::IOError(e.to_string())
    }
}

impl ParleyError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Hardware/device errors may require user intervention
            ParleyError::AudioDeviceError(_) => false,
            // A failed turn is abandoned; the next assist() starts fresh
            ParleyError::TransportError(_) => true,
            ParleyError::CommandError(_) => true,
            ParleyError::ConfigError(_) => false,
            ParleyError::ChannelError(_) => false,
            ParleyError::NotAuthenticated => false,
            ParleyError::IOError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ParleyError::AudioDeviceError(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            ParleyError::TransportError(_) => {
                "The assistant could not be reached. Please try again.".to_string()
            }
            ParleyError::CommandError(_) => "The command could not be completed.".to_string(),
            ParleyError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            ParleyError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            ParleyError::NotAuthenticated => {
                "The assistant is not signed in yet.".to_string()
            }
            ParleyError::IOError(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
