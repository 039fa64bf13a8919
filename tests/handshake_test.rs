// SPDX-License-Identifier: MIT
// Lifecycle and handshake behavior: the state gate, one-shot initialize,
// and version negotiation, driven over a live in-memory connection.

mod common;

use common::{test_ctx, TestClient};
use flowd::config::ServerConfig;
use flowd::ServerContext;
use serde_json::json;

#[tokio::test]
async fn handshake_negotiates_and_reaches_ready() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;

    let id = client.request(
        "initialize",
        Some(json!({
            "protocolVersion": "0.1.0",
            "capabilities": {},
            "clientInfo": { "name": "c", "version": "1" }
        })),
    );
    let response = client.recv_response(id).await;

    assert_eq!(response["result"]["protocolVersion"], "0.1.0");
    assert_eq!(response["result"]["serverInfo"]["name"], "flowd");
    assert!(response["result"]["capabilities"]["logging"].is_object());

    // Ready: a general method now dispatches.
    let id = client.request("tools/list", None);
    let response = client.recv_response(id).await;
    assert!(response["result"]["tools"].is_array());
}

#[tokio::test]
async fn requests_before_initialize_get_not_initialized() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;

    for method in ["tools/list", "resources/read", "prompts/list", "nosuch/method"] {
        let id = client.request(method, Some(json!({ "uri": "file:///x" })));
        let response = client.recv_response(id).await;
        assert_eq!(response["error"]["code"], -32002, "method {method}");
    }
}

#[tokio::test]
async fn ping_is_allowed_before_ready() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;

    let id = client.request("ping", None);
    let response = client.recv_response(id).await;
    assert!(response["result"]["serverTimestamp"].as_i64().is_some());
}

#[tokio::test]
async fn second_initialize_is_rejected_and_version_unchanged() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;
    client.initialize().await;

    let id = client.request(
        "initialize",
        Some(json!({
            "protocolVersion": "0.2.0",
            "capabilities": {},
            "clientInfo": { "name": "c", "version": "1" }
        })),
    );
    let response = client.recv_response(id).await;
    assert_eq!(response["error"]["code"], -32600);

    // The negotiated version did not move.
    common::settle().await;
    let conns = ctx.connections.ready_connections().await;
    assert_eq!(conns.len(), 1);
    assert_eq!(conns[0].negotiated_version(), Some("0.1.0"));
}

#[tokio::test]
async fn version_fallback_picks_newest_lower() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;
    // Supported: ["0.2.0", "0.1.0"]. Requesting 0.1.5 lands on 0.1.0.
    let response = client.initialize_as("0.1.5", json!({})).await;
    assert_eq!(response["result"]["protocolVersion"], "0.1.0");
}

#[tokio::test]
async fn version_below_all_supported_fails_handshake() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;

    let id = client.request(
        "initialize",
        Some(json!({
            "protocolVersion": "0.0.9",
            "capabilities": {},
            "clientInfo": { "name": "c", "version": "1" }
        })),
    );
    let response = client.recv_response(id).await;
    assert_eq!(response["error"]["code"], -32603);
    assert_eq!(response["error"]["data"]["kind"], "UnsupportedVersion");
    assert_eq!(response["error"]["data"]["requestedVersion"], "0.0.9");
}

#[tokio::test]
async fn initialize_with_missing_fields_is_invalid_params() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;

    let id = client.request(
        "initialize",
        Some(json!({ "protocolVersion": "0.1.0" })),
    );
    let response = client.recv_response(id).await;
    assert_eq!(response["error"]["code"], -32602);
}

#[tokio::test]
async fn unknown_method_after_ready_is_method_not_found() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;
    client.initialize().await;

    let id = client.request("tools/destroy", None);
    let response = client.recv_response(id).await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn batch_frames_are_rejected() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;

    client.send_raw(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#);
    let response = client.recv().await;
    assert_eq!(response["error"]["code"], -32600);
}

#[tokio::test]
async fn malformed_json_is_parse_error() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;

    client.send_raw("{oops");
    let response = client.recv().await;
    assert_eq!(response["error"]["code"], -32700);
    assert!(response["id"].is_null());
}

#[tokio::test]
async fn inbound_sampling_request_is_not_callable() {
    let ctx = test_ctx();
    let mut client = TestClient::connect(&ctx).await;
    client.initialize().await;

    let id = client.request(
        "sampling/createMessage",
        Some(json!({ "messages": [], "maxTokens": 16 })),
    );
    let response = client.recv_response(id).await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn connection_limit_rejects_excess_accepts() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let ctx = ServerContext::new(config);

    let mut first = TestClient::connect(&ctx).await;
    first.initialize().await;
    common::settle().await;
    assert_eq!(ctx.connections.count().await, 1);

    // The second accept is rejected immediately; its transport just closes.
    let _second = TestClient::connect(&ctx).await;
    common::settle().await;
    assert_eq!(ctx.connections.count().await, 1);
}
