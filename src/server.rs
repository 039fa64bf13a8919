// SPDX-License-Identifier: MIT
// Per-connection serving: accept the transport, pump frames into the
// dispatcher until the peer goes away, then tear the connection down.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::connection::ConnectionState;
use crate::dispatch::Dispatcher;
use crate::transport::Transport;
use crate::ServerContext;

/// Drive one connection to completion. Returns once the transport is
/// drained or failed; cleanup (cancelling in-flight requests, dropping
/// subscriptions) happens in the connection manager's close path.
pub async fn serve_connection(
    ctx: Arc<ServerContext>,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<()> {
    let conn = match ctx.connections.accept(transport).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(err = %e, "rejecting connection");
            return Ok(());
        }
    };

    let dispatcher = Dispatcher::new(ctx.clone());
    let reason = loop {
        // A failed write (or an explicit close) moves the state forward;
        // stop pulling frames once that happens.
        if conn.state() >= ConnectionState::Closing {
            break "closing";
        }
        match conn.transport().receive().await {
            Ok(Some(frame)) => dispatcher.dispatch_frame(&conn, &frame).await,
            Ok(None) => break "client disconnected",
            Err(e) => {
                debug!(conn = %conn.id(), err = %e, "transport receive failed");
                break "transport error";
            }
        }
    };

    ctx.connections.close(conn.id(), reason).await;
    Ok(())
}
