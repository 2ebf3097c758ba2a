//! libSQL backend — async `ViolationStore` implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::pipeline::types::RuleName;
use crate::store::migrations;
use crate::store::traits::{ViolationRecord, ViolationStore};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn failures_to_json(failures: &[RuleName]) -> Result<String, DatabaseError> {
    serde_json::to_string(failures).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Map a libsql Row to a ViolationRecord.
///
/// Column order matches VIOLATION_COLUMNS:
/// 0:card_id, 1:card_name, 2:is_valid, 3:warning_count, 4:last_failures, 5:created_at, 6:updated_at
fn row_to_record(row: &libsql::Row) -> Result<ViolationRecord, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("violation row parse: {e}"));

    let card_id: String = row.get(0).map_err(parse)?;
    let card_name: String = row.get(1).map_err(parse)?;
    let is_valid: i64 = row.get(2).map_err(parse)?;
    let warning_count: i64 = row.get(3).map_err(parse)?;
    let failures_json: String = row.get(4).map_err(parse)?;
    let created_str: String = row.get(5).map_err(parse)?;
    let updated_str: String = row.get(6).map_err(parse)?;

    let last_failures = serde_json::from_str(&failures_json).unwrap_or_else(|e| {
        warn!(card_id = %card_id, error = %e, "Unreadable last_failures column, treating as empty");
        Vec::new()
    });

    Ok(ViolationRecord {
        card_id,
        card_name,
        is_valid: is_valid != 0,
        warning_count: u32::try_from(warning_count).unwrap_or(0),
        last_failures,
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

async fn first_record(mut rows: libsql::Rows, op: &str) -> Result<Option<ViolationRecord>, DatabaseError> {
    match rows.next().await {
        Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
    }
}

// ── Trait implementation ────────────────────────────────────────────

const VIOLATION_COLUMNS: &str =
    "card_id, card_name, is_valid, warning_count, last_failures, created_at, updated_at";

#[async_trait]
impl ViolationStore for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn find_by_card_id(&self, card_id: &str) -> Result<Option<ViolationRecord>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {VIOLATION_COLUMNS} FROM violations WHERE card_id = ?1"),
                params![card_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_by_card_id: {e}")))?;

        first_record(rows, "find_by_card_id").await
    }

    async fn create(&self, record: &ViolationRecord) -> Result<bool, DatabaseError> {
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO violations (card_id, card_name, is_valid, warning_count, last_failures, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(card_id) DO NOTHING",
                params![
                    record.card_id.as_str(),
                    record.card_name.as_str(),
                    i64::from(record.is_valid),
                    i64::from(record.warning_count),
                    failures_to_json(&record.last_failures)?,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create violation: {e}")))?;

        debug!(card_id = %record.card_id, inserted = inserted > 0, "Violation insert");
        Ok(inserted > 0)
    }

    async fn increment_warning(
        &self,
        card_id: &str,
        failures: &[RuleName],
    ) -> Result<ViolationRecord, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn()
            .query(
                &format!(
                    "UPDATE violations
                     SET warning_count = warning_count + 1, last_failures = ?3, updated_at = ?2
                     WHERE card_id = ?1 AND is_valid = 0
                     RETURNING {VIOLATION_COLUMNS}"
                ),
                params![card_id, now, failures_to_json(failures)?],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_warning: {e}")))?;

        first_record(rows, "increment_warning")
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "violation".into(),
                id: card_id.to_string(),
            })
    }

    async fn record_notified_failures(
        &self,
        card_id: &str,
        failures: &[RuleName],
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE violations SET last_failures = ?2, updated_at = ?3 WHERE card_id = ?1",
                params![card_id, failures_to_json(failures)?, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_notified_failures: {e}")))?;
        Ok(())
    }

    async fn delete(&self, card_id: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM violations WHERE card_id = ?1", params![card_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete violation: {e}")))?;

        if count > 0 {
            info!(card_id, "Violation record deleted");
        }
        Ok(count > 0)
    }

    async fn list_all_invalid(&self) -> Result<Vec<ViolationRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {VIOLATION_COLUMNS} FROM violations WHERE is_valid = 0 ORDER BY created_at ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_all_invalid: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_record(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping violation row: {e}");
                }
            }
        }
        Ok(records)
    }
}
