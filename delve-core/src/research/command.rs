//! User commands and the single-slot gate the controller reads them from.
//!
//! A listener posts commands; the controller takes them only at checkpoints
//! between steps. An unconsumed command is overwritten by the next one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Status,
    Focus,
    Pause,
    Continue,
    Quit,
}

impl Command {
    /// Map a line of user input to a command by its first character.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().chars().next()?.to_ascii_lowercase() {
            's' => Some(Command::Status),
            'f' => Some(Command::Focus),
            'p' => Some(Command::Pause),
            'c' => Some(Command::Continue),
            'q' => Some(Command::Quit),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Command::Status => "status",
            Command::Focus => "focus",
            Command::Pause => "pause",
            Command::Continue => "continue",
            Command::Quit => "quit",
        };
        f.write_str(label)
    }
}

/// Single-slot mailbox shared between the input listener and the controller.
#[derive(Clone, Default)]
pub struct CommandGate {
    inner: Arc<GateInner>,
}

#[derive(Default)]
struct GateInner {
    slot: Mutex<Option<Command>>,
    notify: Notify,
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post a command, replacing any command not yet taken.
    pub fn post(&self, command: Command) {
        let replaced = self.lock().replace(command);
        if let Some(old) = replaced {
            tracing::debug!(%old, new = %command, "Unconsumed command overwritten");
        }
        self.inner.notify.notify_one();
    }

    /// Take the pending command, if any. Never blocks.
    pub fn take(&self) -> Option<Command> {
        self.lock().take()
    }

    pub fn peek(&self) -> Option<Command> {
        *self.lock()
    }

    /// Wait until a command is posted, then take it.
    pub async fn wait(&self) -> Command {
        loop {
            if let Some(command) = self.take() {
                return command;
            }
            self.inner.notify.notified().await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Command>> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CommandGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandGate")
            .field("pending", &self.peek())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_first_character() {
        assert_eq!(Command::parse("s"), Some(Command::Status));
        assert_eq!(Command::parse("  Focus please"), Some(Command::Focus));
        assert_eq!(Command::parse("P"), Some(Command::Pause));
        assert_eq!(Command::parse("c"), Some(Command::Continue));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse("x"), None);
        assert_eq!(Command::parse("   "), None);
    }

    #[test]
    fn test_last_command_wins() {
        let gate = CommandGate::new();
        gate.post(Command::Status);
        gate.post(Command::Quit);
        assert_eq!(gate.peek(), Some(Command::Quit));
        assert_eq!(gate.take(), Some(Command::Quit));
        assert_eq!(gate.take(), None);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_post_from_clone() {
        let gate = CommandGate::new();
        let listener = gate.clone();
        let poster = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            listener.post(Command::Continue);
        });
        let got = tokio::time::timeout(Duration::from_secs(2), gate.wait())
            .await
            .unwrap();
        assert_eq!(got, Command::Continue);
        poster.await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_already_posted_command() {
        let gate = CommandGate::new();
        gate.post(Command::Quit);
        assert_eq!(gate.wait().await, Command::Quit);
    }
}
