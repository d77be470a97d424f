//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data.

mod appointments;
mod donations;
mod messaging;
mod notifications;
mod repository;
mod requests;
mod users;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
///
/// Timestamps are stored as INTEGER epoch milliseconds so that ordering by
/// them is numeric.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        INSERT OR IGNORE INTO meta (id, schema_version, revision_id, generated_at)
        VALUES (1, 1, 0, datetime('now'));
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            identity_id TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            email TEXT NOT NULL,
            blood_type TEXT NOT NULL,
            latitude REAL,
            longitude REAL,
            badges TEXT NOT NULL DEFAULT '[]',
            donations_count INTEGER NOT NULL DEFAULT 0,
            last_donation_at INTEGER,
            eligibility_at INTEGER,
            is_eligible INTEGER NOT NULL DEFAULT 1,
            medical_history TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            CHECK (eligibility_at IS NULL OR last_donation_at IS NULL OR eligibility_at >= last_donation_at)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blood_requests (
            id TEXT PRIMARY KEY,
            patient_name TEXT NOT NULL,
            hospital_name TEXT NOT NULL,
            blood_type TEXT NOT NULL,
            units_required INTEGER NOT NULL,
            requester_id TEXT NOT NULL,
            is_fulfilled INTEGER NOT NULL DEFAULT 0,
            latitude REAL,
            longitude REAL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS donations (
            id TEXT PRIMARY KEY,
            donor_id TEXT NOT NULL,
            date INTEGER NOT NULL,
            units INTEGER NOT NULL,
            donation_type TEXT NOT NULL,
            location TEXT NOT NULL,
            certificate_ref TEXT,
            created_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS appointments (
            id TEXT PRIMARY KEY,
            donor_id TEXT NOT NULL,
            center_name TEXT NOT NULL,
            date INTEGER NOT NULL,
            status TEXT NOT NULL,
            appointment_type TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT PRIMARY KEY,
            pair_key TEXT NOT NULL UNIQUE,
            last_message_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversation_participants (
            identity_id TEXT NOT NULL,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            PRIMARY KEY (identity_id, conversation_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            sender_id TEXT NOT NULL,
            content TEXT NOT NULL,
            message_type TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            notification_type TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0,
            related_id TEXT,
            created_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_requests_type_open ON blood_requests(blood_type, is_fulfilled);
        CREATE INDEX IF NOT EXISTS idx_requests_requester ON blood_requests(requester_id);
        CREATE INDEX IF NOT EXISTS idx_requests_created_at ON blood_requests(created_at);
        CREATE INDEX IF NOT EXISTS idx_donations_donor ON donations(donor_id, date);
        CREATE INDEX IF NOT EXISTS idx_appointments_donor ON appointments(donor_id, date);
        CREATE INDEX IF NOT EXISTS idx_participants_conversation ON conversation_participants(conversation_id);
        CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
