//! Messaging endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{error, success, ApiResult};
use crate::auth::Caller;
use crate::models::{
    Conversation, ConversationSummary, Message, SendMessageRequest, StartConversationRequest,
};
use crate::AppState;

/// GET /api/conversations - The caller's inbox.
pub async fn list_conversations(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<ConversationSummary>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_conversations(&caller).await {
        Ok(conversations) => success(conversations, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/conversations - Open (or reopen) a conversation with another user.
pub async fn start_conversation(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<StartConversationRequest>,
) -> ApiResult<Conversation> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state
        .repo
        .get_or_create_conversation(&caller, &request.other_user_id)
        .await
    {
        Ok(conversation) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(conversation, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/conversations/:id/messages - Messages in send order.
pub async fn list_messages(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Vec<Message>> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.list_messages(&caller, &id).await {
        Ok(messages) => success(messages, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/conversations/:id/messages - Send a message.
pub async fn send_message(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Message> {
    let revision_id = state.repo.get_revision_id().await.unwrap_or(0);

    match state.repo.send_message(&caller, &id, &request).await {
        Ok(message) => {
            let new_revision = state.repo.get_revision_id().await.unwrap_or(revision_id);
            success(message, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}
