//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use parcel_core::config::{ChatConfig, QueryConfig};
use parcel_core::{MemoryStorage, ParcelConfig, ParcelContext};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::{MockServer, ResponseTemplate};

/// Context pointed at the mock server with fast cadences and no retries.
pub fn context_for(server: &MockServer) -> ParcelContext {
    let mut config = ParcelConfig::default();
    config.api.base_url = format!("{}/api", server.uri());
    config.api.timeout_seconds = 5;
    config.query = QueryConfig {
        stale_time_ms: 0,
        gc_time_ms: 60_000,
        retry: 0,
        retry_delay_ms: 10,
    };
    config.chat = ChatConfig {
        conversation_poll_ms: 300,
        message_poll_ms: 120,
        support_admin_id: 3,
    };
    ParcelContext::with_storage(config, Arc::new(MemoryStorage::new()))
        .expect("Failed to build test context")
}

pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

pub fn ok_message(data: Value, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": data,
        "message": message
    }))
}

pub async fn count_requests(server: &MockServer, method: &str, path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == method && r.url.path() == path)
        .count()
}

pub fn chat_message(id: i64, user_id: i64, body: &str, sender: &str) -> Value {
    json!({
        "id": id,
        "message": body,
        "sender_type": sender,
        "sender_name": if sender == "admin" { "Support" } else { "Customer" },
        "user_id": user_id,
        "created_at": format!("2026-03-01T10:00:{:02}Z", id % 60)
    })
}
