// SPDX-License-Identifier: MIT
// Shared test harness: an in-memory transport pair and a client handle that
// drives a live server connection without sockets.

use std::sync::Arc;
use std::time::Duration;

use flowd::config::ServerConfig;
use flowd::server;
use flowd::transport::Transport;
use flowd::ServerContext;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

/// Transport half owned by the server connection.
pub struct ChannelTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
    outbound: mpsc::UnboundedSender<String>,
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn receive(&self) -> anyhow::Result<Option<String>> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn send(&self, frame: &str) -> anyhow::Result<()> {
        self.outbound
            .send(frame.to_string())
            .map_err(|_| anyhow::anyhow!("client side closed"))
    }

    async fn close(&self) {
        // The read loop may be parked inside `receive` holding the lock; in
        // that case the loop ends when the client drops its sender instead.
        if let Ok(mut inbound) = self.inbound.try_lock() {
            inbound.close();
        }
    }

    fn peer(&self) -> String {
        "test".to_string()
    }
}

/// Client half held by the test.
pub struct TestClient {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<String>,
    next_id: i64,
}

impl TestClient {
    /// Spawn a served connection on `ctx` and hand back the client half.
    pub async fn connect(ctx: &Arc<ServerContext>) -> Self {
        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::unbounded_channel();
        let transport = Arc::new(ChannelTransport {
            inbound: Mutex::new(inbound),
            outbound,
        });
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let _ = server::serve_connection(ctx, transport).await;
        });
        // Let the accept path run before the test starts sending.
        tokio::task::yield_now().await;
        Self {
            to_server: Some(to_server),
            from_server,
            next_id: 1,
        }
    }

    pub fn send_raw(&self, frame: &str) {
        self.to_server
            .as_ref()
            .expect("client disconnected")
            .send(frame.to_string())
            .expect("server side closed");
    }

    pub fn send(&self, value: Value) {
        self.send_raw(&value.to_string());
    }

    /// Send a request, allocating the next numeric id. Returns the id used.
    pub fn request(&mut self, method: &str, params: Option<Value>) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        let mut frame = json!({ "jsonrpc": "2.0", "id": id, "method": method });
        if let Some(params) = params {
            frame["params"] = params;
        }
        self.send(frame);
        id
    }

    pub fn notify(&self, method: &str, params: Option<Value>) {
        let mut frame = json!({ "jsonrpc": "2.0", "method": method });
        if let Some(params) = params {
            frame["params"] = params;
        }
        self.send(frame);
    }

    /// Next frame from the server, within a generous timeout.
    pub async fn recv(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.from_server.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed");
        serde_json::from_str(&frame).expect("server sent invalid JSON")
    }

    /// Skip interleaved notifications until the response for `id` arrives.
    pub async fn recv_response(&mut self, id: i64) -> Value {
        loop {
            let frame = self.recv().await;
            if frame["id"] == json!(id) {
                return frame;
            }
        }
    }

    /// Non-blocking poll used to assert that nothing further arrived.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.from_server
            .try_recv()
            .ok()
            .map(|frame| serde_json::from_str(&frame).expect("server sent invalid JSON"))
    }

    /// Run the initialize handshake and return the result object.
    pub async fn initialize(&mut self) -> Value {
        self.initialize_as("0.1.0", json!({})).await
    }

    pub async fn initialize_as(&mut self, version: &str, capabilities: Value) -> Value {
        let id = self.request(
            "initialize",
            Some(json!({
                "protocolVersion": version,
                "capabilities": capabilities,
                "clientInfo": { "name": "test-client", "version": "1" }
            })),
        );
        let response = self.recv_response(id).await;
        self.notify("initialized", None);
        response
    }

    /// Drop the sending half; the server observes a clean disconnect.
    pub fn disconnect(&mut self) {
        self.to_server = None;
    }
}

pub fn test_ctx() -> Arc<ServerContext> {
    ServerContext::new(ServerConfig::default())
}

/// Sleep long enough for spawned server tasks to settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
