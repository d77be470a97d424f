//! Notification log operations.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection};

use super::repository::{bump_revision, from_millis, new_id, now, require_text, to_millis, Repository};
use crate::auth::Caller;
use crate::domain::Badge;
use crate::errors::AppError;
use crate::models::{CreateNotificationRequest, Notification, NotificationType};

impl Repository {
    /// Notifications for one user, newest first.
    pub async fn list_notifications(&self, user_id: &str) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, notification_type, message, is_read, related_id, created_at FROM notifications WHERE user_id = ? ORDER BY created_at DESC, rowid DESC"
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    pub async fn count_unread_notifications(&self, user_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS unread FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("unread")?)
    }

    /// Mark one of the caller's notifications as read.
    pub async fn mark_notification_read(
        &self,
        caller: &Caller,
        id: &str,
    ) -> Result<Notification, AppError> {
        let row = sqlx::query(
            "SELECT id, user_id, notification_type, message, is_read, related_id, created_at FROM notifications WHERE id = ?"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let mut notification = match row {
            Some(row) => notification_from_row(&row)?,
            None => return Err(AppError::NotFound(format!("Notification {} not found", id))),
        };

        if notification.user_id != caller.subject() {
            return Err(AppError::Forbidden(
                "Not authorized to update this notification".to_string(),
            ));
        }

        if !notification.is_read {
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            self.increment_revision().await?;
            notification.is_read = true;
        }

        Ok(notification)
    }

    /// Mark every unread notification of the caller as read; returns how many changed.
    pub async fn mark_all_notifications_read(&self, caller: &Caller) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
            .bind(caller.subject())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.increment_revision().await?;
        }
        Ok(result.rows_affected())
    }

    /// Post a `system` notification to a user.
    pub async fn create_system_notification(
        &self,
        request: &CreateNotificationRequest,
    ) -> Result<Notification, AppError> {
        require_text(&request.user_id, "userId")?;
        require_text(&request.message, "Message")?;

        let created_at = now();
        let mut tx = self.begin_write().await?;
        let id = insert_notification(
            &mut *tx,
            &request.user_id,
            NotificationType::System,
            &request.message,
            request.related_id.as_deref(),
            created_at,
        )
        .await?;
        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(Notification {
            id,
            user_id: request.user_id.clone(),
            notification_type: NotificationType::System,
            message: request.message.clone(),
            is_read: false,
            related_id: request.related_id.clone(),
            created_at,
        })
    }
}

/// Append a notification as a side effect of another mutation.
pub(super) async fn insert_notification(
    conn: &mut SqliteConnection,
    user_id: &str,
    notification_type: NotificationType,
    message: &str,
    related_id: Option<&str>,
    created_at: DateTime<Utc>,
) -> Result<String, AppError> {
    let id = new_id();
    sqlx::query(
        "INSERT INTO notifications (id, user_id, notification_type, message, is_read, related_id, created_at) VALUES (?, ?, ?, ?, 0, ?, ?)"
    )
    .bind(&id)
    .bind(user_id)
    .bind(notification_type.as_str())
    .bind(message)
    .bind(related_id)
    .bind(to_millis(created_at))
    .execute(conn)
    .await?;
    Ok(id)
}

/// One `badge` notification per newly granted badge.
pub(super) async fn notify_badges(
    conn: &mut SqliteConnection,
    user_id: &str,
    badges: &[Badge],
    created_at: DateTime<Utc>,
) -> Result<(), AppError> {
    for badge in badges {
        let message = format!("You earned the \"{}\" badge!", badge.as_str());
        insert_notification(
            &mut *conn,
            user_id,
            NotificationType::Badge,
            &message,
            Some(badge.as_str()),
            created_at,
        )
        .await?;
        tracing::info!(user_id, badge = badge.as_str(), "badge awarded");
    }
    Ok(())
}

fn notification_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Notification, AppError> {
    let kind: String = row.try_get("notification_type")?;
    let is_read: i64 = row.try_get("is_read")?;
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        notification_type: NotificationType::from_str(&kind).unwrap_or(NotificationType::System),
        message: row.try_get("message")?,
        is_read: is_read != 0,
        related_id: row.try_get("related_id")?,
        created_at: from_millis(row.try_get("created_at")?),
    })
}
