//! Telegram Bot API client.

use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outbound text channel keyed by a per-owner chat address.
#[async_trait]
pub trait ExternalMessenger: Send + Sync {
    /// Deliver one Markdown message to `chat_id`.
    async fn send(&self, chat_id: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    description: Option<String>,
}

/// Sends messages through a bot's `sendMessage` endpoint.
pub struct TelegramClient {
    client: Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    /// Create a client for the bot identified by `token`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }
}

#[async_trait]
impl ExternalMessenger for TelegramClient {
    async fn send(&self, chat_id: &str, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "Markdown",
            disable_web_page_preview: false,
        };

        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body: Option<BotResponse> = response.json().await.ok();

        match body {
            Some(BotResponse { ok: true, .. }) => {
                tracing::info!(chat_id = %chat_id, "telegram message sent");
                Ok(())
            }
            Some(BotResponse {
                ok: false,
                description,
            }) => Err(NotifyError::Rejected(
                description.unwrap_or_else(|| "unknown error".to_string()),
            )),
            None => Err(NotifyError::Api {
                status: status.as_u16(),
                message: "unparseable bot api response".to_string(),
            }),
        }
    }
}
