//! The chat command framework.
//!
//! Chat messages starting with the prefix are commands; the session
//! applies the returned outcome rather than multicasting the message.

/// What a processed command asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Send a chat line back to the sender only.
    Reply(String),
    /// Broadcast a chat line to every player.
    Broadcast(String),
    /// Terminate the sender (used by /kill).
    Kill,
}

/// Dispatcher for `/`-prefixed chat commands.
pub struct CommandFramework {
    prefix: char,
}

impl Default for CommandFramework {
    fn default() -> Self {
        CommandFramework::new('/')
    }
}

impl CommandFramework {
    /// Build with a prefix character.
    pub fn new(prefix: char) -> CommandFramework {
        CommandFramework { prefix }
    }

    /// Whether a chat message is a command.
    pub fn is_command(&self, message: &str) -> bool {
        message.starts_with(self.prefix)
    }

    /// Process a command message from `sender`.
    pub fn process(&self, sender: &str, message: &str) -> CommandOutcome {
        let stripped = message.trim_start_matches(self.prefix);
        let mut parts = stripped.splitn(2, ' ');
        let command = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();

        match command {
            "help" => CommandOutcome::Reply(
                "Commands: /help, /say <message>, /kill".to_string(),
            ),
            "say" if !rest.is_empty() => {
                CommandOutcome::Broadcast(format!("[{sender}] {rest}"))
            }
            "say" => CommandOutcome::Reply("Usage: /say <message>".to_string()),
            "kill" => CommandOutcome::Kill,
            unknown => CommandOutcome::Reply(format!("Unknown command: /{unknown}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_commands() {
        let commands = CommandFramework::default();
        assert!(commands.is_command("/help"));
        assert!(!commands.is_command("hello"));
        assert!(!commands.is_command(" /help"));
    }

    #[test]
    fn help_replies() {
        let commands = CommandFramework::default();
        assert!(matches!(
            commands.process("alice", "/help"),
            CommandOutcome::Reply(_)
        ));
    }

    #[test]
    fn say_broadcasts_with_sender() {
        let commands = CommandFramework::default();
        assert_eq!(
            commands.process("alice", "/say hello there"),
            CommandOutcome::Broadcast("[alice] hello there".to_string())
        );
        assert!(matches!(
            commands.process("alice", "/say"),
            CommandOutcome::Reply(_)
        ));
    }

    #[test]
    fn kill_and_unknown() {
        let commands = CommandFramework::default();
        assert_eq!(commands.process("alice", "/kill"), CommandOutcome::Kill);
        assert_eq!(
            commands.process("alice", "/frobnicate"),
            CommandOutcome::Reply("Unknown command: /frobnicate".to_string())
        );
    }
}
