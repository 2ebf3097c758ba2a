//! Outbound notifications to the team chat.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::error::NotifyError;

/// Publishes a rendered message to wherever the team reads it.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sink name for logging.
    fn name(&self) -> &str;

    async fn publish(&self, message: &str) -> Result<(), NotifyError>;
}

/// Posts messages to a Slack incoming webhook.
pub struct SlackNotifier {
    webhook_url: SecretString,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: SecretString) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn publish(&self, message: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({ "text": message });

        let resp = self
            .client
            .post(self.webhook_url.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::SendFailed {
                sink: self.name().into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(status = %status, detail = %detail, "Slack webhook rejected message");
            return Err(NotifyError::Rejected {
                sink: self.name().into(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Writes messages to the log. Used when no chat webhook is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, message: &str) -> Result<(), NotifyError> {
        info!(message = %message, "Notification");
        Ok(())
    }
}
