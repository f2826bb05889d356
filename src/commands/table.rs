//! Phrase table command registry
//!
//! Matches whole queries against registered phrases, ignoring case,
//! surrounding whitespace, repeated spaces and trailing punctuation that
//! speech recognizers like to add.

use crate::commands::{CommandDescriptor, CommandRegistry};
use crate::{ParleyError, Result};
use tracing::debug;

type CommandAction = Box<dyn FnMut() -> Result<bool> + Send>;

struct CommandEntry {
    name: String,
    phrases: Vec<String>,
    action: CommandAction,
}

/// Registry of phrase-triggered commands
#[derive(Default)]
pub struct CommandTable {
    entries: Vec<CommandEntry>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command under one or more trigger phrases
    ///
    /// Registering an existing name replaces it.
    pub fn register<F>(&mut self, name: &str, phrases: &[&str], action: F)
    where
        F: FnMut() -> Result<bool> + Send + 'static,
    {
        self.entries.retain(|entry| entry.name != name);
        self.entries.push(CommandEntry {
            name: name.to_string(),
            phrases: phrases.iter().map(|p| normalize(p)).collect(),
            action: Box::new(action),
        });
    }

    /// Builder-style registration
    pub fn with_command<F>(mut self, name: &str, phrases: &[&str], action: F) -> Self
    where
        F: FnMut() -> Result<bool> + Send + 'static,
    {
        self.register(name, phrases, action);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CommandRegistry for CommandTable {
    fn find_command(&self, text: &str) -> Option<CommandDescriptor> {
        let query = normalize(text);
        if query.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|entry| entry.phrases.iter().any(|p| *p == query))
            .map(|entry| {
                debug!("Query '{}' matched command '{}'", text, entry.name);
                CommandDescriptor::new(entry.name.clone(), text.trim())
            })
    }

    fn run(&mut self, command: &CommandDescriptor) -> Result<bool> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.name == command.name)
            .ok_or_else(|| {
                ParleyError::CommandError(format!("Unknown command: {}", command.name))
            })?;
        (entry.action)()
    }
}

/// Lowercase, collapse whitespace and strip trailing punctuation
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    words
        .join(" ")
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn lights_table(counter: Arc<AtomicUsize>) -> CommandTable {
        CommandTable::new().with_command(
            "lights_on",
            &["turn on the lights", "lights on"],
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            },
        )
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Turn ON   the Lights. "), "turn on the lights");
        assert_eq!(normalize("lights on!?"), "lights on");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_find_command_case_insensitive() {
        let table = lights_table(Arc::new(AtomicUsize::new(0)));

        let found = table.find_command("Turn on the lights").unwrap();
        assert_eq!(found.name, "lights_on");
        assert_eq!(found.query, "Turn on the lights");

        assert!(table.find_command("LIGHTS ON.").is_some());
    }

    #[test]
    fn test_partial_phrases_do_not_match() {
        let table = lights_table(Arc::new(AtomicUsize::new(0)));
        assert!(table.find_command("turn on the lights in the kitchen").is_none());
        assert!(table.find_command("lights").is_none());
        assert!(table.find_command("").is_none());
        assert!(table.find_command("what's the weather").is_none());
    }

    #[test]
    fn test_run_invokes_action() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = lights_table(Arc::clone(&counter));

        let command = table.find_command("lights on").unwrap();
        assert!(table.run(&command).unwrap());
        assert!(table.run(&command).unwrap());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_unknown_command_errors() {
        let mut table = CommandTable::new();
        let result = table.run(&CommandDescriptor::new("missing", "missing"));
        assert!(matches!(result, Err(ParleyError::CommandError(_))));
    }

    #[test]
    fn test_register_replaces_existing_name() {
        let mut table = CommandTable::new();
        table.register("pause", &["pause"], || Ok(true));
        table.register("pause", &["hold on"], || Ok(false));

        assert_eq!(table.len(), 1);
        assert!(table.find_command("pause").is_none());
        let command = table.find_command("hold on").unwrap();
        assert!(!table.run(&command).unwrap());
    }
}
