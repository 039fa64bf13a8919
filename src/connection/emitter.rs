// SPDX-License-Identifier: MIT
// Typed server→client notifications. The per-connection write serialization
// lives in `Connection::send_frame`; this module is the one place that knows
// the notification method names and parameter shapes.

use serde_json::json;
use tracing::warn;

use super::Connection;
use crate::protocol::jsonrpc::encode_notification;
use crate::protocol::messages::{LogMessageParams, ProgressParams, ResourceUpdatedParams};

pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
pub const MESSAGE: &str = "notifications/message";
pub const PROGRESS: &str = "notifications/progress";

/// `notifications/resources/updated` — a subscribed URI changed.
pub async fn resource_updated(conn: &Connection, uri: &str) -> anyhow::Result<()> {
    let params = ResourceUpdatedParams {
        uri: uri.to_string(),
    };
    send(conn, RESOURCES_UPDATED, serde_json::to_value(params)?).await
}

/// `notifications/message` — one log record.
pub async fn log_message(conn: &Connection, params: &LogMessageParams) -> anyhow::Result<()> {
    send(conn, MESSAGE, serde_json::to_value(params)?).await
}

/// `notifications/progress` — progress on a long-running request.
pub async fn progress(conn: &Connection, params: &ProgressParams) -> anyhow::Result<()> {
    send(conn, PROGRESS, serde_json::to_value(params)?).await
}

/// Escape hatch for notification methods without a typed wrapper.
pub async fn notify(conn: &Connection, method: &str, params: serde_json::Value) -> anyhow::Result<()> {
    send(conn, method, params).await
}

async fn send(conn: &Connection, method: &str, params: serde_json::Value) -> anyhow::Result<()> {
    let params = if params.is_null() { json!({}) } else { params };
    let frame = encode_notification(method, params);
    if let Err(e) = conn.send_frame(&frame).await {
        warn!(conn = %conn.id(), method, err = %e, "notification send failed");
        return Err(e);
    }
    Ok(())
}
