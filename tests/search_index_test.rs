mod common;

use chrono::{Duration, Utc};
use common::*;
use message_store::models::{MessageType, NewMessage};
use message_store::services::message_service::MessageService;
use message_store::services::search_index::SearchIndexBridge;
use uuid::Uuid;

#[tokio::test]
async fn document_field_names_match_the_indexer_contract() {
    let pool = test_pool().await;
    let events = sink_emitter();
    let alice = seed_user(&pool, "alice", "Alice").await;
    let conv = seed_conversation(&pool, &[alice]).await;

    let view = send_text(&pool, &events, conv, alice, "Hello World").await;
    let document = SearchIndexBridge::prepare_document(&view);
    let value = serde_json::to_value(&document).unwrap();
    let object = value.as_object().unwrap();

    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "attachmentTypes",
            "content",
            "conversationId",
            "createdAt",
            "hasAttachments",
            "id",
            "isReply",
            "senderId",
            "senderName",
            "senderUsername",
            "type",
        ]
    );

    assert_eq!(object["type"], "text");
    assert_eq!(object["content"], "hello world");
    assert_eq!(object["senderName"], "Alice");
    assert_eq!(object["senderUsername"], "alice");
    assert_eq!(object["isReply"], false);
    assert_eq!(object["hasAttachments"], false);
    assert!(object["createdAt"].is_i64());
    assert_eq!(
        object["createdAt"].as_i64().unwrap(),
        view.created_at.timestamp_millis()
    );
}

#[tokio::test]
async fn reply_documents_carry_normalized_reply_content() {
    let pool = test_pool().await;
    let events = sink_emitter();
    let alice = seed_user(&pool, "alice", "Alice").await;
    let conv = seed_conversation(&pool, &[alice]).await;

    let original = send_text(&pool, &events, conv, alice, "The  ORIGINAL\ttext").await;
    let reply = MessageService::create_message(
        &pool,
        &events,
        NewMessage {
            conversation_id: conv,
            sender_id: alice,
            message_type: MessageType::Text,
            content: "a reply".into(),
            metadata: None,
            reply_to_id: Some(original.id),
        },
    )
    .await
    .unwrap();

    let document = SearchIndexBridge::prepare_document(&reply);
    assert!(document.is_reply);
    assert_eq!(document.reply_to_content.as_deref(), Some("the original text"));

    let value = serde_json::to_value(&document).unwrap();
    assert_eq!(value["replyToContent"], "the original text");
}

#[tokio::test]
async fn attachments_feed_the_document() {
    let pool = test_pool().await;
    let events = sink_emitter();
    let alice = seed_user(&pool, "alice", "Alice").await;
    let conv = seed_conversation(&pool, &[alice]).await;

    let message = MessageService::create_message(
        &pool,
        &events,
        NewMessage {
            conversation_id: conv,
            sender_id: alice,
            message_type: MessageType::Image,
            content: "holiday pics".into(),
            metadata: None,
            reply_to_id: None,
        },
    )
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO message_attachments (id, message_id, file_name, file_type, file_size, storage_key) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(message.id)
    .bind("Beach Sunset.PNG")
    .bind("image/png")
    .bind(123_456_i64)
    .bind("objects/abc")
    .execute(&pool)
    .await
    .unwrap();

    let view = MessageService::fetch_view(&pool, message.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.attachments.len(), 1);

    let document = SearchIndexBridge::prepare_document(&view);
    assert!(document.has_attachments);
    assert_eq!(document.attachment_types, vec!["image/png".to_string()]);
    // File names are searchable through the content field.
    assert_eq!(document.content, "holiday pics beach sunset.png");
}

#[tokio::test]
async fn suggestions_rank_own_recent_queries_before_contacts() {
    let pool = test_pool().await;
    let events = sink_emitter();
    let alice = seed_user(&pool, "alice", "Alice").await;
    let alicia = seed_user(&pool, "alicia", "Alicia").await;
    let bob = seed_user(&pool, "bob", "Bob").await;
    let conv = seed_conversation(&pool, &[alice, alicia, bob]).await;
    send_text(&pool, &events, conv, alice, "hi all").await;

    let now = Utc::now();
    SearchIndexBridge::record_search(&pool, alice, "alpha release", now - Duration::minutes(10))
        .await
        .unwrap();
    SearchIndexBridge::record_search(&pool, alice, "alps trip", now - Duration::minutes(1))
        .await
        .unwrap();
    // Someone else's history must not leak in.
    SearchIndexBridge::record_search(&pool, bob, "alimony", now).await.unwrap();

    let suggestions = SearchIndexBridge::get_suggestions(&pool, alice, "al", 10)
        .await
        .unwrap();
    assert_eq!(
        suggestions,
        vec![
            "alps trip".to_string(),    // own queries, most recent first
            "alpha release".to_string(),
            "Alicia".to_string(),       // then contact-name prefix matches
        ]
    );
}

#[tokio::test]
async fn suggestions_fall_back_to_empty() {
    let pool = test_pool().await;
    let alice = seed_user(&pool, "alice", "Alice").await;

    let none = SearchIndexBridge::get_suggestions(&pool, alice, "zzz", 10)
        .await
        .unwrap();
    assert!(none.is_empty());

    let blank = SearchIndexBridge::get_suggestions(&pool, alice, "   ", 10)
        .await
        .unwrap();
    assert!(blank.is_empty());
}

#[tokio::test]
async fn repeated_queries_are_suggested_once() {
    let pool = test_pool().await;
    let alice = seed_user(&pool, "alice", "Alice").await;

    let now = Utc::now();
    for minutes in [30, 20, 10] {
        SearchIndexBridge::record_search(&pool, alice, "standup notes", now - Duration::minutes(minutes))
            .await
            .unwrap();
    }

    let suggestions = SearchIndexBridge::get_suggestions(&pool, alice, "stand", 10)
        .await
        .unwrap();
    assert_eq!(suggestions, vec!["standup notes".to_string()]);
}
