//! Operator notifications.
//!
//! Delivery failures are reported to the caller but never abort a cycle;
//! [`notify`] logs and swallows them.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Sends `message`, logging instead of propagating a delivery failure.
pub async fn notify(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.send(message).await {
        warn!("Notification not delivered ({}): {}", e, message);
    }
}

/// Writes messages to stdout and the log.
#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        info!("📣 {}", message);
        println!("{}", message);
        Ok(())
    }
}

/// Telegram Bot API `sendMessage`.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_api_base("https://api.telegram.org", token, chat_id)
    }

    pub fn with_api_base(
        api_base: &str,
        token: &str,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", api_base.trim_end_matches('/'), token),
            chat_id: chat_id.into(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "chat_id": self.chat_id,
                "text": message,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!("📣 Telegram: {}", message);
        Ok(())
    }
}
