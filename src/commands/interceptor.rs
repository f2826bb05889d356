//! Command interception ahead of the remote assistant

use crate::commands::{CommandDescriptor, CommandRegistry};
use tracing::{debug, error, info, warn};

/// A command waiting for the current conversation to end
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: CommandDescriptor,
    pub queued: bool,
}

/// Decides whether text is a local command and runs it
///
/// Command failures never propagate: `run` reports them as `false`.
pub struct CommandInterceptor {
    registry: Box<dyn CommandRegistry>,
}

impl CommandInterceptor {
    pub fn new(registry: Box<dyn CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn find_command(&self, text: &str) -> Option<CommandDescriptor> {
        debug!("Checking if '{}' is a command", text);
        let found = self.registry.find_command(text);
        if found.is_none() {
            debug!("No command found for '{}'", text);
        }
        found
    }

    /// Execute a command, returning whether it completed successfully
    pub fn run(&mut self, command: &CommandDescriptor) -> bool {
        info!("Executing command '{}'", command.name);
        match self.registry.run(command) {
            Ok(true) => {
                info!("Command '{}' finished", command.name);
                true
            }
            Ok(false) => {
                warn!("Command '{}' reported failure", command.name);
                false
            }
            Err(e) => {
                error!("Command '{}' failed: {}", command.name, e);
                false
            }
        }
    }

    /// Prepare a command for execution once the active conversation ends
    pub fn defer(&self, command: CommandDescriptor) -> PendingCommand {
        info!("Queueing command '{}' until the conversation ends", command.name);
        PendingCommand {
            command,
            queued: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandTable;
    use crate::ParleyError;

    fn interceptor() -> CommandInterceptor {
        let table = CommandTable::new()
            .with_command("lights_on", &["turn on the lights"], || Ok(true))
            .with_command("unplugged", &["start the kettle"], || Ok(false))
            .with_command("broken", &["open the garage"], || {
                Err(ParleyError::CommandError("garage offline".into()))
            });
        CommandInterceptor::new(Box::new(table))
    }

    #[test]
    fn test_run_success() {
        let mut interceptor = interceptor();
        let command = interceptor.find_command("turn on the lights").unwrap();
        assert!(interceptor.run(&command));
    }

    #[test]
    fn test_unsuccessful_and_erroring_commands_report_false() {
        let mut interceptor = interceptor();

        let command = interceptor.find_command("start the kettle").unwrap();
        assert!(!interceptor.run(&command));

        let command = interceptor.find_command("open the garage").unwrap();
        assert!(!interceptor.run(&command));
    }

    #[test]
    fn test_defer_marks_queued() {
        let interceptor = interceptor();
        let command = interceptor.find_command("turn on the lights").unwrap();
        let pending = interceptor.defer(command.clone());
        assert!(pending.queued);
        assert_eq!(pending.command, command);
    }

    #[test]
    fn test_unknown_text() {
        assert!(interceptor().find_command("what's the weather").is_none());
    }
}
