//! Card service client: fetches card snapshots and registers webhooks.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::board::model::Card;
use crate::config::TrelloConfig;
use crate::error::{FetchError, WebhookError};

/// Which nested collections to include when fetching a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub attachments: bool,
    pub checklists: bool,
    pub list: bool,
    pub members: bool,
}

impl FetchOptions {
    /// Everything the rule library can look at.
    pub const FULL: Self = Self {
        attachments: true,
        checklists: true,
        list: true,
        members: true,
    };

    fn query(&self) -> Vec<(&'static str, &'static str)> {
        let flag = |on: bool| if on { "true" } else { "false" };
        vec![
            ("attachments", flag(self.attachments)),
            ("checklists", if self.checklists { "all" } else { "none" }),
            ("list", flag(self.list)),
            ("members", flag(self.members)),
        ]
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::FULL
    }
}

/// Source of card snapshots.
#[async_trait]
pub trait CardFetcher: Send + Sync {
    async fn fetch_card(&self, card_id: &str, options: FetchOptions) -> Result<Card, FetchError>;
}

/// Webhook registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSubscription {
    pub description: String,
    pub id_model: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
}

/// A webhook as acknowledged by the card service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredWebhook {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub id_model: String,
    #[serde(rename = "callbackURL", default)]
    pub callback_url: String,
    #[serde(default)]
    pub active: bool,
}

/// Registers webhooks with the card service.
#[async_trait]
pub trait WebhookRegistrar: Send + Sync {
    async fn register_webhook(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<RegisteredWebhook, WebhookError>;
}

/// HTTP client for the Trello REST API.
pub struct TrelloClient {
    config: TrelloConfig,
    client: reqwest::Client,
}

impl TrelloClient {
    pub fn new(config: TrelloConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn auth_query(&self) -> [(&'static str, &str); 2] {
        [
            ("key", self.config.api_key.expose_secret()),
            ("token", self.config.api_token.expose_secret()),
        ]
    }
}

#[async_trait]
impl CardFetcher for TrelloClient {
    async fn fetch_card(&self, card_id: &str, options: FetchOptions) -> Result<Card, FetchError> {
        let resp = self
            .client
            .get(self.api_url(&format!("cards/{card_id}")))
            .query(&self.auth_query())
            .query(&options.query())
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                card_id: card_id.to_string(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(card_id, status = %status, "Card fetch rejected");
            return Err(FetchError::Transient(format!("status {status}: {body}")));
        }

        let card: Card = resp
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        debug!(card_id, name = %card.name, "Fetched card snapshot");
        Ok(card)
    }
}

#[async_trait]
impl WebhookRegistrar for TrelloClient {
    async fn register_webhook(
        &self,
        subscription: &WebhookSubscription,
    ) -> Result<RegisteredWebhook, WebhookError> {
        let resp = self
            .client
            .post(self.api_url("webhooks"))
            .query(&self.auth_query())
            .json(subscription)
            .send()
            .await
            .map_err(|e| WebhookError::Registration(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(WebhookError::Registration(format!("status {status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| WebhookError::Registration(format!("invalid response: {e}")))
    }
}
