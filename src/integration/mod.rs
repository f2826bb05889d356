//! Wiring of configuration, collaborators and the session worker

pub mod config;
pub mod orchestrator;

pub use config::{AudioConfig, AuthConfig, SessionConfig};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, SessionHandle};
