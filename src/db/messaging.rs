//! Conversations and messages.
//!
//! A conversation is unique per participant pair; the sorted pair key is a
//! UNIQUE column so create-or-get cannot produce duplicates.

use sqlx::{Row, SqliteConnection};

use super::repository::{bump_revision, from_millis, new_id, now, require_text, to_millis, Repository};
use crate::auth::Caller;
use crate::errors::AppError;
use crate::models::{
    pair_key, Conversation, ConversationSummary, Message, MessageType, OtherParticipant,
    SendMessageRequest,
};

const UNKNOWN_USER: &str = "Unknown User";

impl Repository {
    /// The caller's conversations, most recently active first.
    pub async fn list_conversations(
        &self,
        caller: &Caller,
    ) -> Result<Vec<ConversationSummary>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.last_message_at, c.created_at,
                   other.identity_id AS other_id, u.full_name AS other_name
            FROM conversation_participants me
            JOIN conversations c ON c.id = me.conversation_id
            JOIN conversation_participants other
                 ON other.conversation_id = c.id AND other.identity_id != me.identity_id
            LEFT JOIN users u ON u.identity_id = other.identity_id
            WHERE me.identity_id = ?
            ORDER BY c.last_message_at DESC, c.rowid DESC
            "#,
        )
        .bind(caller.subject())
        .fetch_all(&self.pool)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let other_id: String = row.try_get("other_id")?;
            let other_name: Option<String> = row.try_get("other_name")?;
            let mut participants = vec![caller.subject().to_string(), other_id.clone()];
            participants.sort();

            summaries.push(ConversationSummary {
                conversation: Conversation {
                    id: row.try_get("id")?,
                    participants,
                    last_message_at: from_millis(row.try_get("last_message_at")?),
                    created_at: from_millis(row.try_get("created_at")?),
                },
                other_user: OtherParticipant {
                    identity_id: other_id,
                    full_name: other_name.unwrap_or_else(|| UNKNOWN_USER.to_string()),
                },
            });
        }
        Ok(summaries)
    }

    /// Return the conversation between the caller and `other_user_id`,
    /// creating it on first contact.
    pub async fn get_or_create_conversation(
        &self,
        caller: &Caller,
        other_user_id: &str,
    ) -> Result<Conversation, AppError> {
        require_text(other_user_id, "otherUserId")?;
        if other_user_id.chars().any(char::is_control) {
            return Err(AppError::Validation(
                "otherUserId must not contain control characters".to_string(),
            ));
        }
        if other_user_id == caller.subject() {
            return Err(AppError::Validation(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let key = pair_key(caller.subject(), other_user_id);
        let now = now();
        let mut tx = self.begin_write().await?;

        let inserted = sqlx::query(
            "INSERT INTO conversations (id, pair_key, last_message_at, created_at) VALUES (?, ?, ?, ?) ON CONFLICT(pair_key) DO NOTHING",
        )
        .bind(new_id())
        .bind(&key)
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT id, last_message_at, created_at FROM conversations WHERE pair_key = ?",
        )
        .bind(&key)
        .fetch_one(&mut *tx)
        .await?;
        let id: String = row.try_get("id")?;

        if inserted.rows_affected() > 0 {
            for participant in [caller.subject(), other_user_id] {
                sqlx::query(
                    "INSERT INTO conversation_participants (identity_id, conversation_id) VALUES (?, ?)",
                )
                .bind(participant)
                .bind(&id)
                .execute(&mut *tx)
                .await?;
            }
            bump_revision(&mut *tx).await?;
            tracing::info!(conversation_id = %id, "conversation started");
        }
        tx.commit().await?;

        let mut participants = vec![caller.subject().to_string(), other_user_id.to_string()];
        participants.sort();

        Ok(Conversation {
            id,
            participants,
            last_message_at: from_millis(row.try_get("last_message_at")?),
            created_at: from_millis(row.try_get("created_at")?),
        })
    }

    /// Messages of a conversation in send order. Participants only.
    pub async fn list_messages(
        &self,
        caller: &Caller,
        conversation_id: &str,
    ) -> Result<Vec<Message>, AppError> {
        let mut conn = self.pool.acquire().await?;
        require_participant(&mut *conn, caller, conversation_id).await?;

        let rows = sqlx::query(
            "SELECT id, conversation_id, sender_id, content, message_type, created_at FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, rowid ASC"
        )
        .bind(conversation_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    /// Append a message and bump the conversation's last activity.
    pub async fn send_message(
        &self,
        caller: &Caller,
        conversation_id: &str,
        request: &SendMessageRequest,
    ) -> Result<Message, AppError> {
        require_text(&request.content, "Message content")?;

        let now = now();
        let mut tx = self.begin_write().await?;
        require_participant(&mut *tx, caller, conversation_id).await?;

        let message = Message {
            id: new_id(),
            conversation_id: conversation_id.to_string(),
            sender_id: caller.subject().to_string(),
            content: request.content.clone(),
            message_type: request.message_type,
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, sender_id, content, message_type, created_at) VALUES (?, ?, ?, ?, ?, ?)"
        )
        .bind(&message.id)
        .bind(conversation_id)
        .bind(caller.subject())
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET last_message_at = ? WHERE id = ?")
            .bind(to_millis(now))
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;

        bump_revision(&mut *tx).await?;
        tx.commit().await?;

        Ok(message)
    }
}

/// NotFound for an unknown conversation, Forbidden for a non-participant.
async fn require_participant(
    conn: &mut SqliteConnection,
    caller: &Caller,
    conversation_id: &str,
) -> Result<(), AppError> {
    let row = sqlx::query(
        r#"
        SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?) AS found,
               EXISTS(SELECT 1 FROM conversation_participants
                      WHERE conversation_id = ? AND identity_id = ?) AS member
        "#,
    )
    .bind(conversation_id)
    .bind(conversation_id)
    .bind(caller.subject())
    .fetch_one(conn)
    .await?;

    let found: i64 = row.try_get("found")?;
    let member: i64 = row.try_get("member")?;
    if found == 0 {
        return Err(AppError::NotFound(format!(
            "Conversation {} not found",
            conversation_id
        )));
    }
    if member == 0 {
        return Err(AppError::Forbidden(
            "Not a participant in this conversation".to_string(),
        ));
    }
    Ok(())
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Message, AppError> {
    let kind: String = row.try_get("message_type")?;
    Ok(Message {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender_id: row.try_get("sender_id")?,
        content: row.try_get("content")?,
        message_type: MessageType::from_str(&kind).unwrap_or_default(),
        created_at: from_millis(row.try_get("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::test_support;
    use crate::models::UpsertProfileRequest;

    fn text(content: &str) -> SendMessageRequest {
        SendMessageRequest {
            content: content.to_string(),
            message_type: MessageType::Text,
        }
    }

    #[tokio::test]
    async fn test_create_or_get_is_order_independent() {
        let (repo, _dir) = test_support::repository().await;
        let alice = Caller("alice".to_string());
        let bob = Caller("bob".to_string());

        let first = repo.get_or_create_conversation(&alice, "bob").await.unwrap();
        let second = repo.get_or_create_conversation(&bob, "alice").await.unwrap();
        let third = repo.get_or_create_conversation(&alice, "bob").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        assert_eq!(first.participants, vec!["alice", "bob"]);

        assert_eq!(repo.list_conversations(&alice).await.unwrap().len(), 1);
        assert_eq!(repo.list_conversations(&bob).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_conversation_rejected() {
        let (repo, _dir) = test_support::repository().await;
        let err = repo
            .get_or_create_conversation(&Caller("alice".to_string()), "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_subjects_with_separator_characters_get_distinct_conversations() {
        let (repo, _dir) = test_support::repository().await;
        let err = repo
            .get_or_create_conversation(&Caller("c".to_string()), "a\u{1f}b")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let first = repo
            .get_or_create_conversation(&Caller("1:a".to_string()), "b")
            .await
            .unwrap();
        let second = repo
            .get_or_create_conversation(&Caller("1".to_string()), "a1:b")
            .await
            .unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.participants, vec!["1", "a1:b"]);
        repo.list_messages(&Caller("1".to_string()), &second.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_messages_are_participant_only() {
        let (repo, _dir) = test_support::repository().await;
        let alice = Caller("alice".to_string());
        let bob = Caller("bob".to_string());
        let eve = Caller("eve".to_string());
        let conversation = repo.get_or_create_conversation(&alice, "bob").await.unwrap();

        repo.send_message(&alice, &conversation.id, &text("hello")).await.unwrap();
        repo.send_message(&bob, &conversation.id, &text("hi back")).await.unwrap();

        let messages = repo.list_messages(&bob, &conversation.id).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "hi back"]);

        let err = repo.list_messages(&eve, &conversation.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = repo
            .send_message(&eve, &conversation.id, &text("let me in"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = repo.list_messages(&alice, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = repo
            .send_message(&alice, &conversation.id, &text("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_inbox_orders_by_activity_and_names_other_user() {
        let (repo, _dir) = test_support::repository().await;
        let alice = Caller("alice".to_string());
        repo.upsert_profile(
            &Caller("bob".to_string()),
            &UpsertProfileRequest {
                full_name: "Bob Builder".to_string(),
                email: "bob@example.com".to_string(),
                blood_type: "B+".to_string(),
                latitude: None,
                longitude: None,
            },
        )
        .await
        .unwrap();

        let with_bob = repo.get_or_create_conversation(&alice, "bob").await.unwrap();
        let with_ghost = repo.get_or_create_conversation(&alice, "ghost").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        repo.send_message(&alice, &with_bob.id, &text("ping")).await.unwrap();

        let inbox = repo.list_conversations(&alice).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].conversation.id, with_bob.id);
        assert_eq!(inbox[0].other_user.full_name, "Bob Builder");
        assert_eq!(inbox[1].conversation.id, with_ghost.id);
        assert_eq!(inbox[1].other_user.full_name, "Unknown User");
    }
}
