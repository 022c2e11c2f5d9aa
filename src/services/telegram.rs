//! Telegram Bot API delivery.
//!
//! Sends messages via `POST /bot<token>/sendMessage`. A 429 is retried after
//! the `parameters.retry_after` delay the API returns.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::limiter::ConcurrencyLimiter;
use crate::{
    config::TelegramConfig,
    error::{AppError, AppResult},
    models::{OutboundMessage, RecipientId},
};

const SERVICE: &str = "Telegram API";

/// Maximum number of attempts for rate-limited requests.
const MAX_RATE_LIMIT_ATTEMPTS: u32 = 3;

/// Delivers one rendered message to one recipient.
#[async_trait]
pub trait MessageDelivery: Send + Sync {
    async fn deliver(&self, recipient: RecipientId, message: &OutboundMessage) -> AppResult<()>;
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: RecipientId,
    #[serde(flatten)]
    message: &'a OutboundMessage,
}

#[derive(Clone)]
pub struct TelegramClient {
    http: Client,
    send_message_url: String,
    limiter: ConcurrencyLimiter,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> AppResult<Self> {
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(30)).build()?,
            send_message_url: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                config.bot_token
            ),
            limiter: ConcurrencyLimiter::new("telegram", config.max_concurrent_requests),
        })
    }
}

#[async_trait]
impl MessageDelivery for TelegramClient {
    async fn deliver(&self, recipient: RecipientId, message: &OutboundMessage) -> AppResult<()> {
        let payload = SendMessageRequest {
            chat_id: recipient,
            message,
        };
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .limiter
                .run(self.http.post(&self.send_message_url).json(&payload).send())
                .await?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            if status == StatusCode::TOO_MANY_REQUESTS && attempts < MAX_RATE_LIMIT_ATTEMPTS {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                let wait = body
                    .get("parameters")
                    .and_then(|p| p.get("retry_after"))
                    .and_then(|v| v.as_u64())
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(1));

                tracing::debug!(
                    "Telegram rate limited chat {}, retrying in {:?} (attempt {}/{})",
                    recipient,
                    wait,
                    attempts,
                    MAX_RATE_LIMIT_ATTEMPTS
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
    }
}
