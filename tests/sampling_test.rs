// SPDX-License-Identifier: MIT
// Server-initiated traffic: the sampling bridge round-trip and log record
// fan-out.

mod common;

use common::{test_ctx, TestClient};
use flowd::logging::broadcast_log;
use flowd::protocol::messages::CreateMessageParams;
use flowd::protocol::types::{Content, LogLevel, Role, SamplingMessage};
use serde_json::json;

fn sampling_params() -> CreateMessageParams {
    CreateMessageParams {
        messages: vec![SamplingMessage {
            role: Role::User,
            content: Content::text("summarize the build log"),
        }],
        max_tokens: 128,
        system_prompt: None,
        temperature: None,
        stop_sequences: vec![],
        model_preferences: None,
    }
}

#[tokio::test]
async fn create_message_round_trip() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;
    client.initialize_as("0.1.0", json!({ "sampling": {} })).await;
    common::settle().await;

    let conn = ctx.connections.ready_connections().await.pop().unwrap();
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.sampling.create_message(&conn, sampling_params()).await }
    });

    // The client sees a server-initiated request and answers it.
    let request = client.recv().await;
    assert_eq!(request["method"], "sampling/createMessage");
    assert_eq!(request["params"]["maxTokens"], 128);
    let id = request["id"].clone();

    client.send(json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "content": { "type": "text", "text": "all green" },
            "role": "assistant",
            "model": "test-model-mini",
            "stopReason": "endTurn"
        }
    }));

    let result = task.await.unwrap().unwrap();
    assert_eq!(result.model, "test-model-mini");
    assert!(matches!(result.content, Content::Text { text } if text == "all green"));
}

#[tokio::test]
async fn client_error_response_fails_the_bridge_call() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;
    client.initialize_as("0.1.0", json!({ "sampling": {} })).await;
    common::settle().await;

    let conn = ctx.connections.ready_connections().await.pop().unwrap();
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.sampling.create_message(&conn, sampling_params()).await }
    });

    let request = client.recv().await;
    let id = request["id"].clone();
    client.send(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": -32001, "message": "user declined" }
    }));

    let err = task.await.unwrap().unwrap_err();
    assert_eq!(err.code, -32001);
}

#[tokio::test]
async fn sampling_requires_the_client_capability() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;
    client.initialize().await; // no sampling capability advertised
    common::settle().await;

    let conn = ctx.connections.ready_connections().await.pop().unwrap();
    let err = conn
        .sampling
        .create_message(&conn, sampling_params())
        .await
        .unwrap_err();
    assert_eq!(err.data.unwrap()["kind"], "SamplingUnsupported");
    assert!(client.try_recv().is_none(), "nothing was sent on the wire");
}

#[tokio::test]
async fn log_records_respect_the_shared_floor() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;
    client.initialize().await;
    common::settle().await;

    ctx.log_level.set(LogLevel::Warning);
    let delivered = broadcast_log(
        &ctx.log_level,
        &ctx.connections,
        LogLevel::Info,
        Some("build"),
        json!("below the floor"),
    )
    .await;
    assert_eq!(delivered, 0);

    let delivered = broadcast_log(
        &ctx.log_level,
        &ctx.connections,
        LogLevel::Error,
        Some("build"),
        json!({ "failed": 3 }),
    )
    .await;
    assert_eq!(delivered, 1);

    let frame = client.recv().await;
    assert_eq!(frame["method"], "notifications/message");
    assert_eq!(frame["params"]["level"], "error");
    assert_eq!(frame["params"]["logger"], "build");
}
