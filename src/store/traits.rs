//! Async interface for violation persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;
use crate::pipeline::types::RuleName;

/// Persisted marker that a card currently fails validation.
///
/// Exists only while the card is invalid; a resolved card has no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub card_id: String,
    pub card_name: String,
    pub is_valid: bool,
    /// Number of sweep passes that found the card still invalid.
    pub warning_count: u32,
    /// Rules that were failing at the last notification.
    pub last_failures: Vec<RuleName>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ViolationRecord {
    /// A fresh record for a card that just failed validation.
    pub fn new(card_id: impl Into<String>, card_name: impl Into<String>, failures: Vec<RuleName>) -> Self {
        let now = Utc::now();
        Self {
            card_id: card_id.into(),
            card_name: card_name.into(),
            is_valid: false,
            warning_count: 0,
            last_failures: failures,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Backend-agnostic violation store. `card_id` is a unique key.
#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Get the record for a card, if one exists.
    async fn find_by_card_id(&self, card_id: &str) -> Result<Option<ViolationRecord>, DatabaseError>;

    /// Insert a record unless one already exists for the card.
    /// Returns `true` if the row was inserted.
    async fn create(&self, record: &ViolationRecord) -> Result<bool, DatabaseError>;

    /// Atomically bump the warning count, store `failures` as the last
    /// notified set, and return the updated record.
    /// Fails with `NotFound` if the card has no record.
    async fn increment_warning(
        &self,
        card_id: &str,
        failures: &[RuleName],
    ) -> Result<ViolationRecord, DatabaseError>;

    /// Remember which rules were failing when the card was last notified.
    async fn record_notified_failures(
        &self,
        card_id: &str,
        failures: &[RuleName],
    ) -> Result<(), DatabaseError>;

    /// Delete the record for a card. Returns `true` if a row was removed.
    async fn delete(&self, card_id: &str) -> Result<bool, DatabaseError>;

    /// All records for cards currently failing validation, oldest first.
    async fn list_all_invalid(&self) -> Result<Vec<ViolationRecord>, DatabaseError>;
}
