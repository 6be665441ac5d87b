use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::error::AppResult;
use crate::id::MessageId;
use crate::models::{MessageType, MessageView};

/// Flat record handed to the external full-text indexer. Field names are a
/// contract with that indexer; `createdAt` is epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: MessageId,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_username: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub created_at: i64,
    pub has_attachments: bool,
    pub attachment_types: Vec<String>,
    pub is_reply: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_content: Option<String>,
}

/// Pure transform from stored messages to index documents, plus the
/// suggestion/history queries. Indexing I/O itself belongs to the external
/// search engine consuming `StoreEvent`s.
pub struct SearchIndexBridge;

impl SearchIndexBridge {
    pub fn prepare_document(message: &MessageView) -> SearchDocument {
        // Attachment file names are searchable; they ride along in `content`
        // since the document shape has no separate field for them.
        let mut text = message.content.clone();
        for attachment in &message.attachments {
            text.push(' ');
            text.push_str(&attachment.file_name);
        }

        let mut attachment_types: Vec<String> = Vec::new();
        for attachment in &message.attachments {
            let ty = attachment
                .file_type
                .clone()
                .unwrap_or_else(|| "file".to_string());
            if !attachment_types.contains(&ty) {
                attachment_types.push(ty);
            }
        }

        SearchDocument {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender.id,
            sender_name: message.sender.display_name.clone(),
            sender_username: message.sender.username.clone(),
            content: normalize_content(&text),
            message_type: message.message_type,
            created_at: message.created_at.timestamp_millis(),
            has_attachments: !message.attachments.is_empty(),
            attachment_types,
            is_reply: message.reply_to.is_some(),
            reply_to_content: message
                .reply_to
                .as_ref()
                .map(|reply| normalize_content(&reply.content)),
        }
    }

    /// Autocomplete: the user's own recent queries matching the prefix first
    /// (most recently used first), then contact-name matches from shared
    /// conversations, deduplicated and capped.
    pub async fn get_suggestions(
        db: &Pool<Sqlite>,
        user_id: Uuid,
        prefix: &str,
        limit: i64,
    ) -> AppResult<Vec<String>> {
        let limit = limit.min(20);
        if prefix.trim().is_empty() {
            return Ok(Vec::new());
        }
        let pattern = format!("{prefix}%");

        let history = sqlx::query(
            "SELECT query_text, MAX(searched_at) AS last_used \
             FROM search_history \
             WHERE user_id = $1 AND query_text LIKE $2 \
             GROUP BY query_text \
             ORDER BY last_used DESC \
             LIMIT $3",
        )
        .bind(user_id)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(db)
        .await?;

        let mut suggestions: Vec<String> = history
            .into_iter()
            .map(|r| r.get::<String, _>("query_text"))
            .collect();

        if (suggestions.len() as i64) < limit {
            let contacts = sqlx::query(
                "SELECT DISTINCT u.display_name \
                 FROM users u \
                 JOIN conversation_members cm ON cm.user_id = u.id \
                 JOIN conversation_members me ON me.conversation_id = cm.conversation_id \
                 WHERE me.user_id = $1 AND u.id != $1 \
                   AND (u.display_name LIKE $2 OR u.username LIKE $2) \
                 ORDER BY u.display_name ASC \
                 LIMIT $3",
            )
            .bind(user_id)
            .bind(&pattern)
            .bind(limit - suggestions.len() as i64)
            .fetch_all(db)
            .await?;

            for row in contacts {
                let name: String = row.get("display_name");
                if !suggestions.contains(&name) {
                    suggestions.push(name);
                }
            }
        }

        suggestions.truncate(limit as usize);
        Ok(suggestions)
    }

    /// Record an executed search so future suggestions can rank it.
    pub async fn record_search(
        db: &Pool<Sqlite>,
        user_id: Uuid,
        query_text: &str,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO search_history (user_id, query_text, searched_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(query_text)
        .bind(at)
        .execute(db)
        .await?;
        Ok(())
    }
}

/// Lowercase, drop control characters, collapse runs of whitespace, so the
/// external tokenizer sees deterministic input.
pub fn normalize_content(input: &str) -> String {
    let lowered = input.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
