use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::id::MessageId;
use crate::models::{MessageReceipt, ReceiptType};

/// Idempotent receipt upserts: one row per (message, user, type), last write
/// wins on the timestamp. No business rules live here; the message service
/// decides when a receipt is warranted.
pub struct ReceiptService;

impl ReceiptService {
    pub async fn mark(
        db: &Pool<Sqlite>,
        message_id: MessageId,
        user_id: Uuid,
        receipt_type: ReceiptType,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO message_receipts (message_id, user_id, receipt_type, recorded_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (message_id, user_id, receipt_type) \
             DO UPDATE SET recorded_at = excluded.recorded_at",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(receipt_type.as_str())
        .bind(at)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn receipts_for_message(
        db: &Pool<Sqlite>,
        message_id: MessageId,
    ) -> AppResult<Vec<MessageReceipt>> {
        let rows = sqlx::query(
            "SELECT user_id, receipt_type, recorded_at \
             FROM message_receipts \
             WHERE message_id = $1 \
             ORDER BY recorded_at ASC",
        )
        .bind(message_id)
        .fetch_all(db)
        .await?;

        rows.into_iter()
            .map(|r| {
                let ty: String = r.get("receipt_type");
                let receipt_type = match ty.as_str() {
                    "delivered" => ReceiptType::Delivered,
                    "read" => ReceiptType::Read,
                    other => {
                        return Err(AppError::Config(format!("unknown receipt type: {other}")))
                    }
                };
                Ok(MessageReceipt {
                    message_id,
                    user_id: r.get("user_id"),
                    receipt_type,
                    recorded_at: r.get("recorded_at"),
                })
            })
            .collect()
    }

    /// Batch receipt counts for page hydration.
    pub async fn counts_for(
        db: &Pool<Sqlite>,
        message_ids: &[MessageId],
    ) -> AppResult<HashMap<MessageId, i64>> {
        if message_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT message_id, COUNT(*) AS receipt_count \
             FROM message_receipts WHERE message_id IN (",
        );
        let mut separated = qb.separated(", ");
        for id in message_ids {
            separated.push_bind(*id);
        }
        qb.push(") GROUP BY message_id");

        let rows = qb.build().fetch_all(db).await?;
        let mut counts = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: MessageId = row.get("message_id");
            counts.insert(id, row.get::<i64, _>("receipt_count"));
        }
        Ok(counts)
    }
}
