// SPDX-License-Identifier: MIT
// Request dispatcher: demultiplexes decoded frames, enforces lifecycle
// rules, runs handlers on their own tasks with a per-request cancellation
// scope, and correlates responses back to request ids.

pub mod cancel;

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::connection::{Connection, ConnectionState};
use crate::handlers;
use crate::protocol::jsonrpc::{
    decode, encode_error, encode_response, Message, Notification, Request, RequestId,
};
use crate::protocol::messages::CancelParams;
use crate::protocol::registry::{Direction, MethodKind};
use crate::protocol::RpcError;
use crate::ServerContext;

#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<ServerContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// Entry point for every inbound frame on a connection. Requests are
    /// spawned onto their own task so one slow handler never blocks the
    /// read loop; notifications and response correlation run inline.
    pub async fn dispatch_frame(&self, conn: &Arc<Connection>, raw: &str) {
        conn.touch();

        let message = match decode(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!(conn = %conn.id(), err = %e, "rejecting malformed frame");
                let frame = encode_error(None, &e.to_rpc_error());
                let _ = conn.send_frame(&frame).await;
                return;
            }
        };

        match message {
            Message::Request(request) => {
                let dispatcher = self.clone();
                let conn = Arc::clone(conn);
                tokio::spawn(async move {
                    dispatcher.dispatch_request(&conn, request).await;
                });
            }
            Message::Notification(notification) => {
                self.dispatch_notification(conn, notification);
            }
            Message::Response { id, result } => {
                if !conn.sampling.complete(&id, Ok(result)) {
                    debug!(conn = %conn.id(), request = %id, "unmatched response — dropping");
                }
            }
            Message::Error { id, error } => match id {
                Some(id) => {
                    if !conn.sampling.complete(&id, Err(error)) {
                        debug!(conn = %conn.id(), request = %id, "unmatched error response — dropping");
                    }
                }
                None => {
                    debug!(conn = %conn.id(), code = error.code, "peer error without id — dropping");
                }
            },
        }
    }

    // ─── Requests ───────────────────────────────────────────────────────────

    async fn dispatch_request(&self, conn: &Arc<Connection>, request: Request) {
        let Request { id, method, params } = request;
        trace!(conn = %conn.id(), request = %id, method = %method, "rpc dispatch");

        // Lifecycle gate: before Ready only initialize (from Connected) and
        // ping get through; everything else is "server not initialized".
        match conn.state() {
            ConnectionState::Ready => {
                if method == "initialize" {
                    // Handshake already done; the negotiated version is
                    // immutable for the rest of the connection.
                    self.respond(
                        conn,
                        &id,
                        Err(RpcError::invalid_request(
                            "initialize may only be sent once per connection",
                        )),
                    )
                    .await;
                    return;
                }
            }
            ConnectionState::Connected => {
                if method != "initialize" && method != "ping" {
                    self.respond(conn, &id, Err(RpcError::not_initialized())).await;
                    return;
                }
            }
            _ => {
                self.respond(conn, &id, Err(RpcError::not_initialized())).await;
                return;
            }
        }

        let Some(spec) = self.ctx.methods.lookup(&method) else {
            self.respond(conn, &id, Err(RpcError::method_not_found(&method)))
                .await;
            return;
        };
        if spec.direction == Direction::ServerToClient {
            // Known method, wrong direction — the client cannot call it.
            self.respond(conn, &id, Err(RpcError::method_not_found(&method)))
                .await;
            return;
        }
        if spec.kind == MethodKind::Notification {
            self.respond(
                conn,
                &id,
                Err(RpcError::invalid_request(format!(
                    "{method} is a notification and carries no id"
                ))),
            )
            .await;
            return;
        }
        if let Err(e) = self.ctx.methods.validate_params(spec, params.as_ref()) {
            self.respond(conn, &id, Err(e)).await;
            return;
        }

        // One live in-flight record per (connection, id).
        let token = match self.ctx.cancels.register(conn.id(), id.clone(), &method) {
            Ok(token) => token,
            Err(_) => {
                self.respond(
                    conn,
                    &id,
                    Err(RpcError::invalid_request(format!(
                        "request id {id} is already in flight"
                    ))),
                )
                .await;
                return;
            }
        };

        // Run the handler against its cancellation scope. Losing the race
        // drops the handler future at its next await — cancellation is
        // cooperative at suspension points — and emits -32800.
        let result = tokio::select! {
            biased;
            result = handlers::handle(&method, params, &self.ctx, conn, &token) => result,
            () = token.cancelled() => Err(RpcError::cancelled()),
        };

        let succeeded = result.is_ok();
        let sent = self.respond(conn, &id, result).await;
        self.ctx.cancels.unregister(conn.id(), &id);

        // The handshake completes only once the response is on the wire.
        if sent && succeeded && method == "initialize" {
            if conn.transition(ConnectionState::Ready).is_ok() {
                debug!(conn = %conn.id(), "connection ready");
            }
        }
    }

    /// Emit exactly one response frame for the id. Returns whether the
    /// write succeeded; a failed write has already moved the connection to
    /// Closing.
    async fn respond(
        &self,
        conn: &Arc<Connection>,
        id: &RequestId,
        result: Result<Value, RpcError>,
    ) -> bool {
        let frame = match &result {
            Ok(value) => encode_response(id, value),
            Err(error) => encode_error(Some(id), error),
        };
        match conn.send_frame(&frame).await {
            Ok(()) => true,
            Err(e) => {
                warn!(conn = %conn.id(), request = %id, err = %e, "response write failed");
                false
            }
        }
    }

    // ─── Notifications ──────────────────────────────────────────────────────

    fn dispatch_notification(&self, conn: &Arc<Connection>, notification: Notification) {
        let Notification { method, params } = notification;
        match method.as_str() {
            "initialized" => {
                // Informational; Ready was reached when the initialize
                // response was written.
                conn.set_metadata("initialized", "true");
                debug!(conn = %conn.id(), "client signalled initialized");
            }
            "cancel" => {
                let params: CancelParams = match serde_json::from_value(
                    params.unwrap_or(Value::Null),
                ) {
                    Ok(p) => p,
                    Err(e) => {
                        // Notifications get no response; malformed ones are
                        // dropped per JSON-RPC.
                        debug!(conn = %conn.id(), err = %e, "malformed cancel notification");
                        return;
                    }
                };
                let found = self.ctx.cancels.cancel(
                    conn.id(),
                    &params.request_id,
                    params.reason.as_deref(),
                );
                if !found {
                    trace!(conn = %conn.id(), request = %params.request_id, "cancel for unknown request");
                }
            }
            other => {
                trace!(conn = %conn.id(), method = other, "unhandled notification — dropping");
            }
        }
    }
}
