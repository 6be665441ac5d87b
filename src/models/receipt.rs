use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::id::MessageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptType {
    Delivered,
    Read,
}

impl ReceiptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptType::Delivered => "delivered",
            ReceiptType::Read => "read",
        }
    }
}

/// One row per (message, user, type); re-marking updates `recorded_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub message_id: MessageId,
    pub user_id: Uuid,
    pub receipt_type: ReceiptType,
    pub recorded_at: DateTime<Utc>,
}
