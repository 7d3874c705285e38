//! Chat command grammar.
//!
//! Commands arrive as text such as `/occ 1` or `/rel@gpu_bot`. Parsing is
//! split in two steps so access control can run before argument
//! validation: [`CommandEvent::parse`] only recognizes the command name,
//! and [`BotCommand::parse`] validates arity and argument values.

use std::fmt;
use std::str::FromStr;

use gpuwatch_core::PollInterval;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a chat participant or conversation.
///
/// For private chats the user id and the chat id coincide, so whitelist
/// entries double as broadcast recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(i64);

impl ChatId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ============================================================================
// Command Names
// ============================================================================

/// Commands the bot responds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandName {
    /// `/start` - register and check whitelist membership
    Start,
    /// `/gpu` - detailed usage, one message per device
    Gpu,
    /// `/g` - combined occupancy status
    Quick,
    /// `/occ <id>` - reserve device memory
    Occupy,
    /// `/rel [id]` - release reserved memory
    Release,
    /// `/echo <text>`
    Echo,
    /// `/set_interval <seconds>`
    SetInterval,
}

impl CommandName {
    pub const ALL: [CommandName; 7] = [
        Self::Start,
        Self::Gpu,
        Self::Quick,
        Self::Occupy,
        Self::Release,
        Self::Echo,
        Self::SetInterval,
    ];

    /// Returns the name as typed after the slash.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Gpu => "gpu",
            Self::Quick => "g",
            Self::Occupy => "occ",
            Self::Release => "rel",
            Self::Echo => "echo",
            Self::SetInterval => "set_interval",
        }
    }

    /// Returns true if only whitelisted users may run this command.
    #[must_use]
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Occupy | Self::Release | Self::SetInterval)
    }

    /// Usage text shown when arguments are invalid.
    pub fn usage(self) -> &'static str {
        match self {
            Self::Start => "Usage: /start",
            Self::Gpu => "Usage: /gpu",
            Self::Quick => "Usage: /g",
            Self::Occupy => "Usage: /occ <gpu_id>",
            Self::Release => "Usage: /rel <gpu_id> to release <gpu_id> or simply /rel to release all",
            Self::Echo => "Usage: /echo <anything>",
            Self::SetInterval => "Usage: /set_interval <seconds>",
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| CommandError::UnknownCommand(s.to_string()))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Invalid command input. Every variant renders as a reply for the sender.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Text is not a command the bot knows
    #[error("Unknown command: /{0}")]
    UnknownCommand(String),

    /// Wrong number or shape of arguments
    #[error("{}", .0.usage())]
    Usage(CommandName),

    /// `/set_interval` outside the permitted range
    #[error("Interval must be between {}s and {}s", PollInterval::MIN_SECS, PollInterval::MAX_SECS)]
    IntervalOutOfRange,
}

// ============================================================================
// Inbound Events
// ============================================================================

/// A command received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvent {
    /// Who sent the command; checked against the whitelist.
    pub sender: ChatId,
    /// Human-readable sender name for logs.
    pub sender_name: Option<String>,
    /// Conversation the reply goes to.
    pub chat: ChatId,
    pub name: CommandName,
    pub args: Vec<String>,
}

impl CommandEvent {
    /// Parses message text into a command event.
    ///
    /// Accepts `/name`, `/name@botname` and whitespace-separated arguments.
    ///
    /// # Errors
    /// - `CommandError::UnknownCommand` if the text is not a known command
    pub fn parse(
        sender: ChatId,
        sender_name: Option<String>,
        chat: ChatId,
        text: &str,
    ) -> Result<Self, CommandError> {
        let mut tokens = text.split_whitespace();
        let head = tokens.next().unwrap_or_default();
        let Some(command) = head.strip_prefix('/') else {
            return Err(CommandError::UnknownCommand(head.to_string()));
        };
        let bare = command.split_once('@').map_or(command, |(name, _bot)| name);
        let name = bare.parse::<CommandName>()?;

        Ok(Self {
            sender,
            sender_name,
            chat,
            name,
            args: tokens.map(str::to_string).collect(),
        })
    }

    /// Name used in log lines: username if known, otherwise the id.
    pub fn display_sender(&self) -> String {
        self.sender_name
            .clone()
            .unwrap_or_else(|| self.sender.to_string())
    }
}

// ============================================================================
// Validated Commands
// ============================================================================

/// A command with validated arguments.
///
/// Device ids are kept signed here; range checks against the live device
/// count happen in the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Gpu,
    Quick,
    Occupy { device: i64 },
    /// `None` releases every device.
    Release { device: Option<i64> },
    Echo { text: String },
    SetInterval { interval: PollInterval },
}

impl BotCommand {
    /// Validates the arguments of `name`.
    ///
    /// # Errors
    /// - `CommandError::Usage` on wrong arity or non-numeric arguments
    /// - `CommandError::IntervalOutOfRange` for intervals outside `[1, 3600]`
    pub fn parse(name: CommandName, args: &[String]) -> Result<Self, CommandError> {
        let usage = || CommandError::Usage(name);
        match name {
            CommandName::Start => Ok(Self::Start),
            CommandName::Gpu => Ok(Self::Gpu),
            CommandName::Quick => Ok(Self::Quick),
            CommandName::Occupy => match args {
                [id] => Ok(Self::Occupy {
                    device: id.parse().map_err(|_| usage())?,
                }),
                _ => Err(usage()),
            },
            CommandName::Release => match args {
                [] => Ok(Self::Release { device: None }),
                [id] => Ok(Self::Release {
                    device: Some(id.parse().map_err(|_| usage())?),
                }),
                _ => Err(usage()),
            },
            CommandName::Echo => match args {
                [text] => Ok(Self::Echo { text: text.clone() }),
                _ => Err(usage()),
            },
            CommandName::SetInterval => match args {
                [secs] => {
                    let secs: i64 = secs.parse().map_err(|_| usage())?;
                    let interval = u64::try_from(secs)
                        .ok()
                        .and_then(|s| PollInterval::from_secs(s).ok())
                        .ok_or(CommandError::IntervalOutOfRange)?;
                    Ok(Self::SetInterval { interval })
                }
                _ => Err(usage()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn event(text: &str) -> Result<CommandEvent, CommandError> {
        CommandEvent::parse(ChatId::new(7), Some("alice".into()), ChatId::new(7), text)
    }

    #[test]
    fn test_parse_plain_command() {
        let ev = event("/occ 1").unwrap();
        assert_eq!(ev.name, CommandName::Occupy);
        assert_eq!(ev.args, args(&["1"]));
    }

    #[test]
    fn test_parse_strips_bot_mention() {
        let ev = event("/rel@gpu_bot  2 ").unwrap();
        assert_eq!(ev.name, CommandName::Release);
        assert_eq!(ev.args, args(&["2"]));
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert!(matches!(event("hello"), Err(CommandError::UnknownCommand(_))));
        assert!(matches!(event(""), Err(CommandError::UnknownCommand(_))));
        assert!(matches!(event("/reboot"), Err(CommandError::UnknownCommand(_))));
    }

    #[test]
    fn test_quick_status_name() {
        assert_eq!("g".parse::<CommandName>().unwrap(), CommandName::Quick);
    }

    #[test]
    fn test_privileged_commands() {
        let privileged: Vec<_> = CommandName::ALL
            .into_iter()
            .filter(|c| c.is_privileged())
            .collect();
        assert_eq!(
            privileged,
            vec![CommandName::Occupy, CommandName::Release, CommandName::SetInterval]
        );
    }

    #[test]
    fn test_occupy_arity() {
        assert_eq!(
            BotCommand::parse(CommandName::Occupy, &args(&["0"])),
            Ok(BotCommand::Occupy { device: 0 })
        );
        assert_eq!(
            BotCommand::parse(CommandName::Occupy, &[]),
            Err(CommandError::Usage(CommandName::Occupy))
        );
        assert_eq!(
            BotCommand::parse(CommandName::Occupy, &args(&["zero"])),
            Err(CommandError::Usage(CommandName::Occupy))
        );
    }

    #[test]
    fn test_occupy_keeps_negative_ids_for_range_check() {
        assert_eq!(
            BotCommand::parse(CommandName::Occupy, &args(&["-1"])),
            Ok(BotCommand::Occupy { device: -1 })
        );
    }

    #[test]
    fn test_release_arity() {
        assert_eq!(
            BotCommand::parse(CommandName::Release, &[]),
            Ok(BotCommand::Release { device: None })
        );
        assert_eq!(
            BotCommand::parse(CommandName::Release, &args(&["3"])),
            Ok(BotCommand::Release { device: Some(3) })
        );
        assert!(BotCommand::parse(CommandName::Release, &args(&["1", "2"])).is_err());
    }

    #[test]
    fn test_echo_requires_one_argument() {
        assert_eq!(
            BotCommand::parse(CommandName::Echo, &args(&["hi"])),
            Ok(BotCommand::Echo { text: "hi".into() })
        );
        assert!(BotCommand::parse(CommandName::Echo, &args(&["hi", "there"])).is_err());
    }

    #[test]
    fn test_set_interval_range() {
        assert_eq!(
            BotCommand::parse(CommandName::SetInterval, &args(&["0"])),
            Err(CommandError::IntervalOutOfRange)
        );
        assert_eq!(
            BotCommand::parse(CommandName::SetInterval, &args(&["-5"])),
            Err(CommandError::IntervalOutOfRange)
        );
        assert_eq!(
            BotCommand::parse(CommandName::SetInterval, &args(&["3601"])),
            Err(CommandError::IntervalOutOfRange)
        );
        let parsed = BotCommand::parse(CommandName::SetInterval, &args(&["3600"])).unwrap();
        assert_eq!(
            parsed,
            BotCommand::SetInterval {
                interval: PollInterval::from_secs(3600).unwrap()
            }
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CommandError::IntervalOutOfRange.to_string(),
            "Interval must be between 1s and 3600s"
        );
        assert_eq!(
            CommandError::Usage(CommandName::SetInterval).to_string(),
            "Usage: /set_interval <seconds>"
        );
    }
}
