//! Database repository shared state and helpers.
//!
//! Entity operations live in sibling modules as further `impl Repository`
//! blocks. Multi-record mutations run inside one transaction.

use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::domain::{Badge, BloodType, DeferralPolicy};
use crate::errors::AppError;
use crate::models::RevisionInfo;

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pub(super) pool: SqlitePool,
    pub(super) policy: DeferralPolicy,
}

impl Repository {
    pub fn new(pool: SqlitePool, policy: DeferralPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn deferral_policy(&self) -> &DeferralPolicy {
        &self.policy
    }

    /// Transaction holding the write lock from `BEGIN`, so concurrent
    /// read-then-write mutations queue on `busy_timeout` instead of failing
    /// with SQLITE_BUSY.
    pub(super) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// Get the current revision ID.
    pub async fn get_revision_id(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT revision_id FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("revision_id")?)
    }

    /// Get revision info.
    pub async fn get_revision_info(&self) -> Result<RevisionInfo, AppError> {
        let row = sqlx::query("SELECT revision_id, generated_at FROM meta WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(RevisionInfo {
            revision_id: row.try_get("revision_id")?,
            generated_at: row.try_get("generated_at")?,
        })
    }

    /// Increment the revision ID and return the new value.
    pub async fn increment_revision(&self) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        bump_revision(&mut *conn).await?;
        drop(conn);
        self.get_revision_id().await
    }
}

/// Bump the revision on an existing connection, typically inside a transaction.
pub(super) async fn bump_revision(conn: &mut SqliteConnection) -> Result<(), AppError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query("UPDATE meta SET revision_id = revision_id + 1, generated_at = ? WHERE id = 1")
        .bind(&now)
        .execute(conn)
        .await?;
    Ok(())
}

// Helper functions shared by the entity modules

/// Current time truncated to the millisecond precision we store.
pub(super) fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

pub(super) fn to_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(super) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub(super) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(super) fn parse_blood_type(stored: &str) -> Result<BloodType, AppError> {
    BloodType::parse(stored)
        .ok_or_else(|| AppError::Internal(format!("Corrupt blood type in database: {}", stored)))
}

pub(super) fn parse_badges(s: &str) -> Vec<Badge> {
    let names: Vec<String> = serde_json::from_str(s).unwrap_or_default();
    names.iter().filter_map(|n| Badge::from_str(n)).collect()
}

pub(super) fn badges_json(badges: &[Badge]) -> String {
    let names: Vec<&str> = badges.iter().map(Badge::as_str).collect();
    serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string())
}

/// Reject blank required text fields.
pub(super) fn require_text(value: &str, field: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(())
}
