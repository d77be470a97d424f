//! Notification endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::auth::Caller;
use crate::models::{CreateNotificationRequest, Notification, UnreadCount};
use crate::AppState;

/// GET /api/notifications - The caller's notifications, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<Notification>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_notifications(caller.subject()).await {
        Ok(notifications) => success(notifications, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/notifications/unread-count
pub async fn unread_count(State(state): State<AppState>, caller: Caller) -> ApiResult<UnreadCount> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.count_unread_notifications(caller.subject()).await {
        Ok(count) => success(UnreadCount { count }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/notifications/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Notification> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.mark_notification_read(&caller, &id).await {
        Ok(notification) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(notification, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/notifications/read-all - Returns how many were marked.
pub async fn mark_all_read(State(state): State<AppState>, caller: Caller) -> ApiResult<u64> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.mark_all_notifications_read(&caller).await {
        Ok(changed) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(changed, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/notifications - Post a system notification to a user.
pub async fn create_notification(
    State(state): State<AppState>,
    _caller: Caller,
    Json(request): Json<CreateNotificationRequest>,
) -> ApiResult<Notification> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.create_system_notification(&request).await {
        Ok(notification) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(notification, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
