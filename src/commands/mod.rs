//! Local commands
//!
//! Queries that resolve to a registered command are handled on this machine
//! and never reach the remote assistant.

pub mod interceptor;
pub mod table;

use crate::Result;

pub use interceptor::{CommandInterceptor, PendingCommand};
pub use table::CommandTable;

/// A command resolved from a text query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Registry key of the command
    pub name: String,
    /// The query text that matched
    pub query: String,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

/// Lookup and execution of local commands
pub trait CommandRegistry: Send {
    /// Resolve a text query to a command
    fn find_command(&self, text: &str) -> Option<CommandDescriptor>;

    /// Execute a command, reporting whether it completed successfully
    fn run(&mut self, command: &CommandDescriptor) -> Result<bool>;
}
