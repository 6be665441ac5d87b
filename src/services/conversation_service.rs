use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::error::AppResult;
use crate::id::MessageId;
use crate::models::ConversationMember;

/// The membership slice the store consults. Conversation management itself
/// (creation, roles, invites) is owned elsewhere; this store only reads
/// standing and moves the per-member read cursor.
pub struct ConversationService;

impl ConversationService {
    pub async fn is_active_member(
        db: &Pool<Sqlite>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let rec = sqlx::query(
            "SELECT 1 FROM conversation_members \
             WHERE conversation_id = $1 AND user_id = $2 AND is_active = 1 \
             LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(rec.is_some())
    }

    pub async fn member(
        db: &Pool<Sqlite>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<ConversationMember>> {
        let row = sqlx::query(
            "SELECT is_active, last_read_message_id, last_read_at \
             FROM conversation_members \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;

        Ok(row.map(|r| ConversationMember {
            conversation_id,
            user_id,
            is_active: r.get("is_active"),
            last_read_message_id: r.get::<Option<MessageId>, _>("last_read_message_id"),
            last_read_at: r.get::<Option<DateTime<Utc>>, _>("last_read_at"),
        }))
    }

    pub async fn advance_read_cursor(
        db: &Pool<Sqlite>,
        conversation_id: Uuid,
        user_id: Uuid,
        message_id: MessageId,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE conversation_members \
             SET last_read_message_id = $1, last_read_at = $2 \
             WHERE conversation_id = $3 AND user_id = $4",
        )
        .bind(message_id)
        .bind(at)
        .bind(conversation_id)
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Bump the conversation's last-activity marker; runs inside the message
    /// insert transaction.
    pub async fn touch_last_activity(
        conn: &mut SqliteConnection,
        conversation_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query("UPDATE conversations SET last_message_at = $1 WHERE id = $2")
            .bind(at)
            .bind(conversation_id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
