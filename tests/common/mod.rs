#![allow(dead_code)]

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use message_store::db;
use message_store::events::EventEmitter;
use message_store::models::{MessageType, MessageView, NewMessage};
use message_store::services::message_service::MessageService;

pub async fn test_pool() -> Pool<Sqlite> {
    let pool = db::init_pool("sqlite::memory:", 1)
        .await
        .expect("in-memory pool");
    db::MIGRATOR.run(&pool).await.expect("migrations");
    pool
}

/// Emitter with no consumer; emission is fire-and-forget so this is fine for
/// tests that do not assert on events.
pub fn sink_emitter() -> EventEmitter {
    EventEmitter::channel(64).0
}

pub async fn seed_user(pool: &Pool<Sqlite>, username: &str, display_name: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username, display_name) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(username)
        .bind(display_name)
        .execute(pool)
        .await
        .expect("insert user");
    id
}

pub async fn seed_conversation(pool: &Pool<Sqlite>, members: &[Uuid]) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO conversations (id, created_at) VALUES ($1, $2)")
        .bind(id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .expect("insert conversation");
    for member in members {
        add_member(pool, id, *member, true).await;
    }
    id
}

pub async fn add_member(pool: &Pool<Sqlite>, conversation_id: Uuid, user_id: Uuid, active: bool) {
    sqlx::query(
        "INSERT INTO conversation_members (conversation_id, user_id, is_active, joined_at) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(conversation_id)
    .bind(user_id)
    .bind(active)
    .bind(Utc::now())
    .execute(pool)
    .await
    .expect("insert member");
}

pub async fn send_text(
    pool: &Pool<Sqlite>,
    events: &EventEmitter,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> MessageView {
    MessageService::create_message(
        pool,
        events,
        NewMessage {
            conversation_id,
            sender_id,
            message_type: MessageType::Text,
            content: content.to_string(),
            metadata: None,
            reply_to_id: None,
        },
    )
    .await
    .expect("create message")
}
