//! gpuwatch Protocol - Chat command grammar and wire types
//!
//! This crate provides the command grammar understood by the bot
//! (`/occ 0`, `/rel`, `/set_interval 30`, ...), the reply texts sent
//! back to users, and the Telegram Bot API structures exchanged by the
//! daemon's transport.

pub mod command;
pub mod reply;
pub mod telegram;

pub use command::{BotCommand, ChatId, CommandError, CommandEvent, CommandName};
pub use telegram::{ApiResponse, Chat, GetUpdates, Message, ParseMode, SendMessage, Update, User};
