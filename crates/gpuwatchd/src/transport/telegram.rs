//! Telegram Bot API transport.
//!
//! Outbound messages use `sendMessage`; inbound commands are fetched with
//! `getUpdates` long polling and forwarded on an mpsc channel.
//!
//! The bot token is part of every request URL, so request errors are
//! stripped of their URL before they are logged or returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gpuwatch_protocol::{
    ApiResponse, ChatId, CommandEvent, GetUpdates, ParseMode, SendMessage, Update,
};

use super::{DeliveryError, MessageFormat, Messenger};

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Server-side long-poll timeout for `getUpdates`, in seconds.
const LONG_POLL_SECS: u64 = 30;

/// Client-side request timeout; must exceed the long-poll timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(LONG_POLL_SECS + 10);

/// Pause after a failed `getUpdates` call.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Buffer of the inbound command channel.
const EVENT_BUFFER: usize = 64;

/// Errors from the `getUpdates` side of the transport.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error {code}: {description}")]
    Api { code: i64, description: String },
}

/// Bot API client used for both directions.
pub struct TelegramTransport {
    client: Client,
    /// `<api_url>/bot<token>`
    base_url: String,
}

impl TelegramTransport {
    /// Creates a client for `token` against `api_url`.
    pub fn new(api_url: &str, token: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    /// Fetches updates with id `>= offset`, waiting up to the long-poll timeout.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, PollError> {
        let query = GetUpdates {
            offset,
            timeout: LONG_POLL_SECS,
            allowed_updates: &["message"],
        };

        let response = self
            .client
            .post(self.method_url("getUpdates"))
            .json(&query)
            .send()
            .await
            .map_err(|e| PollError::Http(e.without_url().to_string()))?;

        let body: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| PollError::Http(e.without_url().to_string()))?;

        if !body.ok {
            return Err(PollError::Api {
                code: body.error_code.unwrap_or_default(),
                description: body.description.unwrap_or_default(),
            });
        }
        Ok(body.result.unwrap_or_default())
    }

    /// Spawns the long-polling task and returns the inbound command channel.
    ///
    /// Non-command messages and unknown commands are dropped. The task
    /// stops on cancellation or when the receiver is dropped.
    pub fn spawn_update_listener(
        self: Arc<Self>,
        cancel_token: CancellationToken,
    ) -> mpsc::Receiver<CommandEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let mut offset = 0;
            info!("Telegram update listener started");

            loop {
                let result = tokio::select! {
                    biased;

                    _ = cancel_token.cancelled() => break,
                    result = self.get_updates(offset) => result,
                };

                let updates = match result {
                    Ok(updates) => updates,
                    Err(e) => {
                        warn!(error = %e, "Failed to fetch updates, retrying");
                        tokio::select! {
                            _ = cancel_token.cancelled() => break,
                            _ = sleep(RETRY_DELAY) => continue,
                        }
                    }
                };

                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let Some(event) = update.message.as_ref().and_then(|m| m.to_command_event())
                    else {
                        continue;
                    };
                    match event {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                debug!("Command receiver dropped, stopping listener");
                                return;
                            }
                        }
                        Err(e) => debug!(error = %e, "Ignoring message"),
                    }
                }
            }

            info!("Telegram update listener stopped");
        });

        rx
    }

    async fn post_message(
        &self,
        recipient: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<(), DeliveryError> {
        let body = SendMessage {
            chat_id: recipient.get(),
            text,
            parse_mode,
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                recipient,
                reason: e.without_url().to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let reason = response
            .json::<ApiResponse<serde_json::Value>>()
            .await
            .ok()
            .and_then(|body| body.description)
            .unwrap_or_else(|| status.to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DeliveryError::Unauthorized { recipient, reason })
            }
            _ => Err(DeliveryError::Rejected {
                recipient,
                status: status.as_u16(),
                reason,
            }),
        }
    }
}

#[async_trait]
impl Messenger for TelegramTransport {
    async fn send_message(
        &self,
        recipient: ChatId,
        text: &str,
        format: MessageFormat,
    ) -> Result<(), DeliveryError> {
        match format {
            MessageFormat::Plain => self.post_message(recipient, text, None).await,
            MessageFormat::Markdown => {
                match self
                    .post_message(recipient, text, Some(ParseMode::Markdown))
                    .await
                {
                    // Usernames with underscores break Markdown entities
                    Err(DeliveryError::Rejected { status: 400, reason, .. })
                        if reason.contains("can't parse entities") =>
                    {
                        debug!(recipient = %recipient, "Markdown rejected, resending as plain text");
                        self.post_message(recipient, text, None).await
                    }
                    other => other,
                }
            }
        }
    }
}
