use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::id::MessageId;
use crate::services::search_index::SearchDocument;

/// What happened, described for the external indexing/delivery consumers.
/// Created/edited carry the prepared search document so the indexer never
/// reads back through the store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    MessageCreated { document: SearchDocument },
    MessageEdited { document: SearchDocument },
    MessageDeleted {
        message_id: MessageId,
        conversation_id: Uuid,
    },
}

/// Fire-and-forget emission: consumers own their delivery and retry policy,
/// and a lagging or absent consumer never fails the store operation that
/// produced the event.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<StoreEvent>,
}

impl EventEmitter {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StoreEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: StoreEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!(error = %e, "store event dropped");
        }
    }
}
