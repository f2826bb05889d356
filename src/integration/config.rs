//! Configuration for the session layer
//!
//! Read-only from the session's point of view. Text queries travel with each
//! start request rather than through configuration.

use crate::{ParleyError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Credentials used to construct the assistant-service client
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth client secrets file
    pub credentials_path: Option<PathBuf>,

    /// Where the service client caches its access tokens
    pub token_path: Option<PathBuf>,
}

/// Audio format negotiated with the assistant service
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of microphone audio sent to the service
    pub sample_rate_in: u32,

    /// Sample rate of response audio received from the service
    pub sample_rate_out: u32,

    /// Wire encoding name, e.g. "LINEAR16"
    pub encoding: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_in: 16000,
            sample_rate_out: 24000,
            encoding: "LINEAR16".to_string(),
        }
    }
}

/// Configuration for a complete session
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Service credentials
    pub auth: AuthConfig,

    /// Audio format settings
    pub audio: AudioConfig,

    /// Language requested from the assistant
    pub language_code: String,

    /// Optional WAV file played as the acknowledgment ping
    pub ping_sound: Option<PathBuf>,

    /// Phrase prepended to sentences passed to `say`
    pub repeat_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            audio: AudioConfig::default(),
            language_code: "en-US".to_string(),
            ping_sound: None,
            repeat_prefix: "repeat after me".to_string(),
        }
    }
}

impl SessionConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| ParleyError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ParleyError::ConfigError(format!(
                "Failed to read config {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Set the credentials
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Set the audio settings
    pub fn with_audio(mut self, audio: AudioConfig) -> Self {
        self.audio = audio;
        self
    }

    /// Set the language code
    pub fn with_language_code(mut self, code: impl Into<String>) -> Self {
        self.language_code = code.into();
        self
    }

    /// Use a WAV file for the ping sound
    pub fn with_ping_sound(mut self, path: impl Into<PathBuf>) -> Self {
        self.ping_sound = Some(path.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate_in == 0 || self.audio.sample_rate_out == 0 {
            return Err(ParleyError::ConfigError(
                "Audio sample rates must be non-zero".to_string(),
            ));
        }

        if self.audio.encoding.trim().is_empty() {
            return Err(ParleyError::ConfigError(
                "Audio encoding is required".to_string(),
            ));
        }

        if self.repeat_prefix.trim().is_empty() {
            return Err(ParleyError::ConfigError(
                "repeat_prefix must not be empty".to_string(),
            ));
        }

        if let Some(path) = &self.ping_sound {
            if !path.exists() {
                return Err(ParleyError::ConfigError(format!(
                    "Ping sound not found: {:?}",
                    path
                )));
            }
        }

        if let Some(path) = &self.auth.credentials_path {
            if !path.exists() {
                return Err(ParleyError::ConfigError(format!(
                    "Credentials file not found: {:?}",
                    path
                )));
            }
        }

        Ok(())
    }
}
