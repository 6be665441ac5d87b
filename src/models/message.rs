use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::MessageId;

/// Placeholder content written over a deleted message. Readers must key off
/// `is_deleted`, never off this string.
pub const DELETED_MESSAGE_TOMBSTONE: &str = "[This message was deleted]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    File,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::File => "file",
            MessageType::System => "system",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "video" => Some(MessageType::Video),
            "audio" => Some(MessageType::Audio),
            "file" => Some(MessageType::File),
            "system" => Some(MessageType::System),
            _ => None,
        }
    }
}

/// A message row as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub reply_to_id: Option<MessageId>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Append-only edit history row; `previous_content` is the value the message
/// held immediately before the edit. Ids are ULID strings so history keeps a
/// stable order even for same-millisecond edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEdit {
    pub id: String,
    pub message_id: MessageId,
    pub previous_content: String,
    pub edited_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderSummary {
    pub id: Uuid,
    pub display_name: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplySummary {
    pub id: MessageId,
    pub sender_id: Uuid,
    pub content: String,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentSummary {
    pub id: Uuid,
    pub file_name: String,
    pub file_type: Option<String>,
    pub file_size: i64,
    pub storage_key: String,
}

/// A fully hydrated message as returned by reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub conversation_id: Uuid,
    pub sender: SenderSummary,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub reply_to: Option<ReplySummary>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub edits: Vec<MessageEdit>,
    pub attachments: Vec<AttachmentSummary>,
    pub receipt_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,
    pub content: String,
    pub metadata: Option<serde_json::Value>,
    pub reply_to_id: Option<MessageId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageOptions {
    /// Opaque to callers: the id of the oldest message of the previous page,
    /// exclusive lower bound for the next one.
    pub cursor: Option<MessageId>,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    /// Count of all non-deleted messages in the conversation; display-only,
    /// eventually consistent under concurrent inserts.
    pub total: i64,
    pub has_more: bool,
    pub next_cursor: Option<MessageId>,
}

impl MessagePage {
    pub fn empty() -> Self {
        Self {
            messages: Vec::new(),
            total: 0,
            has_more: false,
            next_cursor: None,
        }
    }
}
