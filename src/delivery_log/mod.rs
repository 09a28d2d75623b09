//! Append-only record of notification attempts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::DbPool;
use crate::transport::{DeliverySummary, TargetOutcome};

#[cfg(test)]
mod tests;

/// Separator used when storing owner and target lists.
pub const LIST_SEPARATOR: &str = ", ";

const LOG_COLUMNS: &str =
    "id, owners, targets, title, body, success_count, failure_count, results, created_at";

#[derive(Error, Debug)]
pub enum DeliveryLogError {
    #[error("Invalid delivery record: {0}")]
    InvalidRecord(String),
    #[error("Stored delivery results are unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What gets appended for one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDeliveryRecord {
    /// Owners the recipients were resolved from; empty for token and topic
    /// sends.
    pub owners: Vec<String>,
    /// Tokens in resolution order, or the topic name.
    pub targets: Vec<String>,
    pub title: Option<String>,
    pub body: String,
    pub summary: DeliverySummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeliveryLogEntry {
    pub id: i64,
    pub owners: String,
    pub targets: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: String,
    pub success_count: usize,
    pub failure_count: usize,
    pub results: Vec<TargetOutcome>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryLogRow {
    id: i64,
    owners: String,
    targets: String,
    title: Option<String>,
    body: String,
    success_count: i64,
    failure_count: i64,
    results: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<DeliveryLogRow> for DeliveryLogEntry {
    type Error = DeliveryLogError;

    fn try_from(row: DeliveryLogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owners: row.owners,
            targets: row.targets,
            title: row.title,
            body: row.body,
            success_count: row.success_count.max(0) as usize,
            failure_count: row.failure_count.max(0) as usize,
            results: serde_json::from_str(&row.results)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct DeliveryLog {
    pool: DbPool,
}

impl DeliveryLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, record: NewDeliveryRecord) -> Result<DeliveryLogEntry, DeliveryLogError> {
        let summary = &record.summary;
        if summary.success_count + summary.failure_count != summary.results.len() {
            return Err(DeliveryLogError::InvalidRecord(format!(
                "{} successes and {} failures do not match {} results",
                summary.success_count,
                summary.failure_count,
                summary.results.len()
            )));
        }

        let query = format!(
            "INSERT INTO delivery_log
                (owners, targets, title, body, success_count, failure_count, results, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING {LOG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DeliveryLogRow>(&query)
            .bind(record.owners.join(LIST_SEPARATOR))
            .bind(record.targets.join(LIST_SEPARATOR))
            .bind(&record.title)
            .bind(&record.body)
            .bind(summary.success_count as i64)
            .bind(summary.failure_count as i64)
            .bind(serde_json::to_string(&summary.results)?)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await?;

        DeliveryLogEntry::try_from(row)
    }

    /// Most recent entries first.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<DeliveryLogEntry>, DeliveryLogError> {
        let query = format!("SELECT {LOG_COLUMNS} FROM delivery_log ORDER BY id DESC LIMIT ?");
        sqlx::query_as::<_, DeliveryLogRow>(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DeliveryLogEntry::try_from)
            .collect()
    }

    pub async fn count(&self) -> Result<i64, DeliveryLogError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM delivery_log")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
