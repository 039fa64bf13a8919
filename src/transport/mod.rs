// SPDX-License-Identifier: MIT
// Transport abstraction. The core consumes decoded text frames one at a
// time and hands back complete frames to send; byte-level framing
// (newline-delimited stdio, WebSocket text frames) lives in the
// implementations.

pub mod stdio;
pub mod ws;

use async_trait::async_trait;

/// One client session's wire. Implementations are internally synchronized:
/// `receive` is called from the connection's read loop only, `send` may be
/// called from any task (the connection serializes writers above this).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Next decoded text frame. `Ok(None)` means the peer closed cleanly.
    async fn receive(&self) -> anyhow::Result<Option<String>>;

    /// Write one complete frame.
    async fn send(&self, frame: &str) -> anyhow::Result<()>;

    /// Best-effort close; subsequent `receive` returns `Ok(None)`.
    async fn close(&self);

    /// Peer description for logs.
    fn peer(&self) -> String {
        "unknown".to_string()
    }
}
