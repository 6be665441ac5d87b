use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use crate::db;
use crate::error::{AppError, AppResult};
use crate::events::{EventEmitter, StoreEvent};
use crate::id::MessageId;
use crate::models::{
    AttachmentSummary, MessageEdit, MessagePage, MessageType, MessageView, NewMessage, PageOptions,
    ReplySummary, SenderSummary, DELETED_MESSAGE_TOMBSTONE,
};
use crate::services::conversation_service::ConversationService;
use crate::services::receipt_service::ReceiptService;
use crate::services::search_index::SearchIndexBridge;

/// Bounded retry budget for the idempotent read paths.
const MAX_READ_RETRIES: u32 = 3;

const MESSAGE_SELECT: &str = "SELECT m.id, m.conversation_id, m.sender_id, m.message_type, \
            m.content, m.metadata, m.reply_to_id, m.is_edited, m.edited_at, \
            m.is_deleted, m.deleted_at, m.created_at, \
            u.display_name AS sender_display_name, u.username AS sender_username, \
            r.sender_id AS reply_sender_id, r.content AS reply_content, \
            r.is_deleted AS reply_is_deleted \
     FROM messages m \
     JOIN users u ON u.id = m.sender_id \
     LEFT JOIN messages r ON r.id = m.reply_to_id";

pub struct MessageService;

impl MessageService {
    /// Create a message. The insert and the conversation's last-activity
    /// bump commit together; the indexing event is emitted only after the
    /// commit and never fails the call.
    pub async fn create_message(
        db: &Pool<Sqlite>,
        events: &EventEmitter,
        input: NewMessage,
    ) -> AppResult<MessageView> {
        if !ConversationService::is_active_member(db, input.conversation_id, input.sender_id)
            .await?
        {
            return Err(AppError::NotAMember);
        }

        if let Some(reply_id) = input.reply_to_id {
            let target = sqlx::query(
                "SELECT conversation_id, is_deleted FROM messages WHERE id = $1",
            )
            .bind(reply_id)
            .fetch_optional(db)
            .await?
            .ok_or_else(|| AppError::InvalidReplyTarget("reply target does not exist".into()))?;

            let target_conversation: Uuid = target.get("conversation_id");
            if target_conversation != input.conversation_id {
                return Err(AppError::InvalidReplyTarget(
                    "reply target belongs to another conversation".into(),
                ));
            }
            if target.get::<bool, _>("is_deleted") {
                return Err(AppError::InvalidReplyTarget(
                    "reply target has been deleted".into(),
                ));
            }
        }

        let id = MessageId::generate();
        let now = Utc::now();

        let mut tx = db.begin().await?;
        sqlx::query(
            "INSERT INTO messages \
                 (id, conversation_id, sender_id, message_type, content, metadata, \
                  reply_to_id, is_edited, is_deleted, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0, 0, $8)",
        )
        .bind(id)
        .bind(input.conversation_id)
        .bind(input.sender_id)
        .bind(input.message_type.as_str())
        .bind(&input.content)
        .bind(input.metadata.clone().map(sqlx::types::Json))
        .bind(input.reply_to_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        ConversationService::touch_last_activity(&mut *tx, input.conversation_id, now).await?;
        tx.commit().await?;

        let view = Self::fetch_view(db, id)
            .await?
            .ok_or(AppError::MessageNotFound)?;
        events.emit(StoreEvent::MessageCreated {
            document: SearchIndexBridge::prepare_document(&view),
        });
        tracing::debug!(message_id = %id, conversation_id = %input.conversation_id, "message created");
        Ok(view)
    }

    /// Edit a message's content. The history insert (capturing the pre-edit
    /// content) and the content update are one transaction: both or neither.
    pub async fn edit_message(
        db: &Pool<Sqlite>,
        events: &EventEmitter,
        message_id: MessageId,
        actor_id: Uuid,
        new_content: &str,
    ) -> AppResult<MessageView> {
        let mut tx = db.begin().await?;

        let row = sqlx::query("SELECT sender_id, content, is_deleted FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::MessageNotFound)?;

        if row.get::<bool, _>("is_deleted") {
            return Err(AppError::MessageDeleted);
        }
        if row.get::<Uuid, _>("sender_id") != actor_id {
            return Err(AppError::NotAuthor);
        }
        let current_content: String = row.get("content");
        if current_content == new_content {
            return Err(AppError::NoOpEdit);
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO message_edits (id, message_id, previous_content, edited_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(MessageId::generate().to_string())
        .bind(message_id)
        .bind(&current_content)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE messages SET content = $1, is_edited = 1, edited_at = $2 WHERE id = $3",
        )
        .bind(new_content)
        .bind(now)
        .bind(message_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let view = Self::fetch_view(db, message_id)
            .await?
            .ok_or(AppError::MessageNotFound)?;
        events.emit(StoreEvent::MessageEdited {
            document: SearchIndexBridge::prepare_document(&view),
        });
        Ok(view)
    }

    /// Soft delete: flag, timestamp, tombstone content. Author-only, one-way,
    /// and idempotent so a client retry after a timeout is always safe.
    pub async fn delete_message(
        db: &Pool<Sqlite>,
        events: &EventEmitter,
        message_id: MessageId,
        actor_id: Uuid,
    ) -> AppResult<()> {
        let mut tx = db.begin().await?;

        let row = sqlx::query(
            "SELECT conversation_id, sender_id, is_deleted FROM messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::MessageNotFound)?;

        if row.get::<Uuid, _>("sender_id") != actor_id {
            return Err(AppError::NotAuthor);
        }
        if row.get::<bool, _>("is_deleted") {
            return Ok(());
        }
        let conversation_id: Uuid = row.get("conversation_id");

        sqlx::query(
            "UPDATE messages SET is_deleted = 1, deleted_at = $1, content = $2 WHERE id = $3",
        )
        .bind(Utc::now())
        .bind(DELETED_MESSAGE_TOMBSTONE)
        .bind(message_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        events.emit(StoreEvent::MessageDeleted {
            message_id,
            conversation_id,
        });
        tracing::debug!(message_id = %message_id, "message soft-deleted");
        Ok(())
    }

    /// Reverse-chronological page of non-deleted messages. Non-members get an
    /// empty page rather than an error: callers authorize upstream and the
    /// store only defends. The cursor is the id of the oldest returned
    /// message; `id < cursor` (strict) keeps pages duplicate- and gap-free
    /// under concurrent inserts.
    pub async fn get_messages(
        db: &Pool<Sqlite>,
        conversation_id: Uuid,
        actor_id: Uuid,
        options: PageOptions,
    ) -> AppResult<MessagePage> {
        if !ConversationService::is_active_member(db, conversation_id, actor_id).await? {
            return Ok(MessagePage::empty());
        }

        db::retry_idempotent(MAX_READ_RETRIES, || async move {
            let rows = sqlx::query(&format!(
                "{MESSAGE_SELECT} \
                 WHERE m.conversation_id = $1 AND m.is_deleted = 0 \
                   AND ($2 IS NULL OR m.id < $2) \
                 ORDER BY m.id DESC \
                 LIMIT $3",
            ))
            .bind(conversation_id)
            .bind(options.cursor)
            .bind(options.limit + 1)
            .fetch_all(db)
            .await?;

            let mut messages = rows
                .iter()
                .map(view_from_row)
                .collect::<AppResult<Vec<_>>>()?;

            let has_more = messages.len() as i64 > options.limit;
            if has_more {
                messages.truncate(options.limit as usize);
            }
            let next_cursor = if has_more {
                messages.last().map(|m| m.id)
            } else {
                None
            };

            let total: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND is_deleted = 0",
            )
            .bind(conversation_id)
            .fetch_one(db)
            .await?;

            Self::hydrate(db, &mut messages).await?;

            Ok(MessagePage {
                messages,
                total,
                has_more,
                next_cursor,
            })
        })
        .await
    }

    /// Move the member's read cursor and upsert the read receipt. The two
    /// writes are independent pieces of state; both are individually
    /// idempotent, so a retry after a crash between them converges.
    pub async fn mark_messages_as_read(
        db: &Pool<Sqlite>,
        conversation_id: Uuid,
        actor_id: Uuid,
        message_id: MessageId,
    ) -> AppResult<()> {
        let member = ConversationService::member(db, conversation_id, actor_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or(AppError::NotAMember)?;

        let row = sqlx::query("SELECT conversation_id, is_deleted FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_optional(db)
            .await?
            .ok_or(AppError::MessageNotFound)?;
        if row.get::<Uuid, _>("conversation_id") != conversation_id
            || row.get::<bool, _>("is_deleted")
        {
            return Err(AppError::MessageNotFound);
        }

        let now = Utc::now();
        ConversationService::advance_read_cursor(db, conversation_id, actor_id, message_id, now)
            .await?;
        db::retry_idempotent(MAX_READ_RETRIES, || {
            ReceiptService::mark(db, message_id, member.user_id, crate::models::ReceiptType::Read, now)
        })
        .await?;
        Ok(())
    }

    /// Count of non-deleted messages from other senders past the member's
    /// read cursor. Non-members get 0, not an error.
    pub async fn get_unread_count(
        db: &Pool<Sqlite>,
        conversation_id: Uuid,
        actor_id: Uuid,
    ) -> AppResult<i64> {
        let member = ConversationService::member(db, conversation_id, actor_id).await?;
        let member = match member {
            Some(m) if m.is_active => m,
            _ => return Ok(0),
        };

        let last_read = member.last_read_message_id;
        db::retry_idempotent(MAX_READ_RETRIES, || async move {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM messages \
                 WHERE conversation_id = $1 AND is_deleted = 0 AND sender_id != $2 \
                   AND ($3 IS NULL OR id > $3)",
            )
            .bind(conversation_id)
            .bind(actor_id)
            .bind(last_read)
            .fetch_one(db)
            .await?;
            Ok(count)
        })
        .await
    }

    /// Full edit history, most recent first. Membership of the message's
    /// conversation is required; histories are small, so one batch fetch.
    pub async fn get_message_edit_history(
        db: &Pool<Sqlite>,
        message_id: MessageId,
        actor_id: Uuid,
    ) -> AppResult<Vec<MessageEdit>> {
        let conversation_id: Uuid =
            sqlx::query_scalar("SELECT conversation_id FROM messages WHERE id = $1")
                .bind(message_id)
                .fetch_optional(db)
                .await?
                .ok_or(AppError::MessageNotFound)?;

        if !ConversationService::is_active_member(db, conversation_id, actor_id).await? {
            return Err(AppError::NotAMember);
        }

        let rows = sqlx::query(
            "SELECT id, previous_content, edited_at FROM message_edits \
             WHERE message_id = $1 \
             ORDER BY edited_at DESC, id DESC",
        )
        .bind(message_id)
        .fetch_all(db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MessageEdit {
                id: r.get("id"),
                message_id,
                previous_content: r.get("previous_content"),
                edited_at: r.get("edited_at"),
            })
            .collect())
    }

    /// Single hydrated message.
    pub async fn fetch_view(
        db: &Pool<Sqlite>,
        message_id: MessageId,
    ) -> AppResult<Option<MessageView>> {
        let row = sqlx::query(&format!("{MESSAGE_SELECT} WHERE m.id = $1"))
            .bind(message_id)
            .fetch_optional(db)
            .await?;

        let Some(row) = row else { return Ok(None) };
        let mut views = vec![view_from_row(&row)?];
        Self::hydrate(db, &mut views).await?;
        Ok(views.pop())
    }

    /// Attach edit lists, attachment lists, and receipt counts to a batch of
    /// views with one query per concern.
    async fn hydrate(db: &Pool<Sqlite>, views: &mut [MessageView]) -> AppResult<()> {
        if views.is_empty() {
            return Ok(());
        }
        let ids: Vec<MessageId> = views.iter().map(|v| v.id).collect();

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, message_id, previous_content, edited_at \
             FROM message_edits WHERE message_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        qb.push(") ORDER BY edited_at DESC, id DESC");
        let edit_rows = qb.build().fetch_all(db).await?;

        let mut edits_map: HashMap<MessageId, Vec<MessageEdit>> = HashMap::new();
        for row in edit_rows {
            let message_id: MessageId = row.get("message_id");
            edits_map.entry(message_id).or_default().push(MessageEdit {
                id: row.get("id"),
                message_id,
                previous_content: row.get("previous_content"),
                edited_at: row.get("edited_at"),
            });
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, message_id, file_name, file_type, file_size, storage_key \
             FROM message_attachments WHERE message_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        qb.push(")");
        let attachment_rows = qb.build().fetch_all(db).await?;

        let mut attachments_map: HashMap<MessageId, Vec<AttachmentSummary>> = HashMap::new();
        for row in attachment_rows {
            let message_id: MessageId = row.get("message_id");
            attachments_map
                .entry(message_id)
                .or_default()
                .push(AttachmentSummary {
                    id: row.get("id"),
                    file_name: row.get("file_name"),
                    file_type: row.get("file_type"),
                    file_size: row.get("file_size"),
                    storage_key: row.get("storage_key"),
                });
        }

        let receipt_counts = ReceiptService::counts_for(db, &ids).await?;

        for view in views.iter_mut() {
            view.edits = edits_map.remove(&view.id).unwrap_or_default();
            view.attachments = attachments_map.remove(&view.id).unwrap_or_default();
            view.receipt_count = receipt_counts.get(&view.id).copied().unwrap_or(0);
        }
        Ok(())
    }
}

fn view_from_row(row: &SqliteRow) -> AppResult<MessageView> {
    let type_text: String = row.get("message_type");
    let message_type = MessageType::parse(&type_text)
        .ok_or_else(|| AppError::Config(format!("unknown message type: {type_text}")))?;

    let metadata: Option<sqlx::types::Json<serde_json::Value>> = row.try_get("metadata")?;

    let reply_to_id: Option<MessageId> = row.try_get("reply_to_id")?;
    let reply_to = match reply_to_id {
        Some(id) => Some(ReplySummary {
            id,
            sender_id: row.try_get("reply_sender_id")?,
            content: row.try_get("reply_content")?,
            is_deleted: row.try_get("reply_is_deleted")?,
        }),
        None => None,
    };

    Ok(MessageView {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender: SenderSummary {
            id: row.try_get("sender_id")?,
            display_name: row.try_get("sender_display_name")?,
            username: row.try_get("sender_username")?,
        },
        message_type,
        content: row.try_get("content")?,
        metadata: metadata.map(|j| j.0),
        reply_to,
        is_edited: row.try_get("is_edited")?,
        edited_at: row.try_get::<Option<DateTime<Utc>>, _>("edited_at")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get::<Option<DateTime<Utc>>, _>("deleted_at")?,
        created_at: row.try_get("created_at")?,
        edits: Vec::new(),
        attachments: Vec::new(),
        receipt_count: 0,
    })
}
