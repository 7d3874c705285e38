//! Chat transport.
//!
//! The daemon sends messages through [`Messenger`] and receives commands
//! as [`CommandEvent`]s on an mpsc channel. Message delivery, update
//! polling and authentication live behind these two seams.

use async_trait::async_trait;
use thiserror::Error;

use gpuwatch_protocol::ChatId;

mod telegram;

pub use telegram::{TelegramTransport, DEFAULT_API_URL};

/// How a message body should be rendered by the chat client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageFormat {
    #[default]
    Plain,
    Markdown,
}

/// Per-recipient delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The recipient blocked the bot or never started a chat with it
    #[error("not authorized to message {recipient}: {reason}")]
    Unauthorized { recipient: ChatId, reason: String },

    /// The API refused the message for another reason
    #[error("message to {recipient} rejected ({status}): {reason}")]
    Rejected {
        recipient: ChatId,
        status: u16,
        reason: String,
    },

    /// The API could not be reached
    #[error("transport error sending to {recipient}: {reason}")]
    Transport { recipient: ChatId, reason: String },
}

impl DeliveryError {
    pub fn recipient(&self) -> ChatId {
        match self {
            Self::Unauthorized { recipient, .. }
            | Self::Rejected { recipient, .. }
            | Self::Transport { recipient, .. } => *recipient,
        }
    }
}

/// Outbound side of the chat transport.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends `text` to one recipient.
    ///
    /// # Errors
    /// - `DeliveryError::Unauthorized` if the recipient cannot be messaged
    async fn send_message(
        &self,
        recipient: ChatId,
        text: &str,
        format: MessageFormat,
    ) -> Result<(), DeliveryError>;
}
