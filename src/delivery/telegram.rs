//! Telegram Bot API delivery channel.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::DeliveryChannel;
use crate::config::TelegramConfig;
use crate::{RelayError, Result};

/// Request timeout for Bot API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    chat_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends messages through `sendMessage`.
pub struct TelegramChannel {
    client: Client,
    endpoint: String,
}

impl TelegramChannel {
    /// Create a channel for the configured bot.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(RelayError::Config("telegram token is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::Delivery(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: send_message_url(&config.api_base, &config.token),
        })
    }
}

fn send_message_url(api_base: &str, token: &str) -> String {
    format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token)
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, subscriber_id: i64, message: &str) -> Result<()> {
        let payload = SendMessagePayload {
            chat_id: subscriber_id,
            text: message,
        };

        // The URL embeds the token, so keep reqwest's error text out of the message.
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::Delivery(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        let body: ApiResponse = response.json().await.map_err(|_| {
            RelayError::Delivery(format!("unexpected response (HTTP {})", status))
        })?;

        if !body.ok {
            return Err(RelayError::Delivery(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ));
        }

        debug!(subscriber_id, "Message delivered");
        Ok(())
    }
}
