//! Telegram Bot API structures.
//!
//! Only the fields the daemon reads are modelled; unknown fields are
//! ignored so API additions do not break parsing.

use serde::{Deserialize, Serialize};

use crate::{ChatId, CommandError, CommandEvent};

/// Envelope of every Bot API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
}

/// One entry of a `getUpdates` result.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Message {
    /// Converts a text message into a command event.
    ///
    /// Returns `None` for messages without text or sender and for plain
    /// text; an unrecognised `/command` yields `Some(Err(..))`.
    pub fn to_command_event(&self) -> Option<Result<CommandEvent, CommandError>> {
        let text = self.text.as_deref()?;
        let from = self.from.as_ref()?;
        if !text.starts_with('/') {
            return None;
        }
        let name = from.username.clone().or_else(|| from.first_name.clone());
        Some(CommandEvent::parse(
            ChatId::new(from.id),
            name,
            ChatId::new(self.chat.id),
            text,
        ))
    }
}

/// Text formatting understood by `sendMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    Markdown,
}

/// Request body of `sendMessage`.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessage<'a> {
    pub chat_id: i64,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
}

/// Query of `getUpdates`.
#[derive(Debug, Clone, Serialize)]
pub struct GetUpdates {
    pub offset: i64,
    /// Long-poll timeout in seconds.
    pub timeout: u64,
    pub allowed_updates: &'static [&'static str],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandName;

    #[test]
    fn test_parse_updates_response() {
        let json = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 10,
                    "message": {
                        "message_id": 1,
                        "from": {"id": 42, "is_bot": false, "first_name": "Alice", "username": "alice"},
                        "chat": {"id": 42, "type": "private"},
                        "date": 1700000000,
                        "text": "/occ 1"
                    }
                },
                {"update_id": 11, "edited_message": {}}
            ]
        }"#;

        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        assert!(resp.ok);
        let updates = resp.result.unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates[1].message.is_none());

        let event = updates[0]
            .message
            .as_ref()
            .and_then(Message::to_command_event)
            .unwrap()
            .unwrap();
        assert_eq!(event.sender, ChatId::new(42));
        assert_eq!(event.sender_name.as_deref(), Some("alice"));
        assert_eq!(event.name, CommandName::Occupy);
        assert_eq!(event.args, vec!["1".to_string()]);
    }

    #[test]
    fn test_parse_error_response() {
        let json = r#"{"ok": false, "error_code": 403, "description": "Forbidden: bot was blocked by the user"}"#;
        let resp: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(403));
        assert!(resp.result.is_none());
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        let msg = Message {
            message_id: 1,
            from: Some(User {
                id: 1,
                username: None,
                first_name: Some("Bob".into()),
            }),
            chat: Chat { id: 1 },
            text: Some("hello".into()),
        };
        assert!(msg.to_command_event().is_none());
    }

    #[test]
    fn test_send_message_serialization() {
        let body = SendMessage {
            chat_id: 5,
            text: "hi",
            parse_mode: Some(ParseMode::Markdown),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["parse_mode"], "Markdown");

        let plain = SendMessage {
            chat_id: 5,
            text: "hi",
            parse_mode: None,
        };
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json.get("parse_mode").is_none());
    }
}
