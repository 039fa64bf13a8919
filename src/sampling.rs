// SPDX-License-Identifier: MIT
// Sampling bridge: server-initiated `sampling/createMessage` requests to the
// client's LLM, with response correlation by request id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::connection::Connection;
use crate::protocol::jsonrpc::{encode_request, RequestId};
use crate::protocol::messages::{CreateMessageParams, CreateMessageResult};
use crate::protocol::{DomainError, RpcError};

pub const CREATE_MESSAGE: &str = "sampling/createMessage";

/// Per-connection correlator for server-initiated requests. Ids are drawn
/// from a counter that only this side uses, so they cannot collide with
/// anything else in flight on the connection.
pub struct SamplingBridge {
    next_id: AtomicI64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Result<Value, RpcError>>>>,
}

impl Default for SamplingBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingBridge {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Ask the client's LLM for a message and await the correlated response.
    ///
    /// Fails with `SamplingUnsupported` unless the client advertised the
    /// `sampling` capability at handshake.
    pub async fn create_message(
        &self,
        conn: &Connection,
        params: CreateMessageParams,
    ) -> Result<CreateMessageResult, RpcError> {
        if !conn.supports_sampling() {
            return Err(DomainError::SamplingUnsupported.into());
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id.clone(), tx);

        let params = serde_json::to_value(&params)
            .map_err(|e| RpcError::internal(format!("encode sampling params: {e}")))?;
        let frame = encode_request(&id, CREATE_MESSAGE, params);

        if let Err(e) = conn.send_frame(&frame).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(RpcError::internal(format!("sampling send failed: {e}")));
        }
        debug!(conn = %conn.id(), request = %id, "sampling request sent");

        match rx.await {
            Ok(Ok(result)) => serde_json::from_value(result)
                .map_err(|e| RpcError::internal(format!("malformed sampling result: {e}"))),
            Ok(Err(err)) => Err(err),
            // Sender dropped: connection closed while we were waiting.
            Err(_) => Err(RpcError::internal("connection closed during sampling")),
        }
    }

    /// Route an inbound response or error to the awaiting caller. Returns
    /// false when no request with that id is pending.
    pub fn complete(&self, id: &RequestId, outcome: Result<Value, RpcError>) -> bool {
        match self.pending.lock().unwrap().remove(id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Fail every pending call. Used on connection teardown.
    pub fn abort_all(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        for (_, tx) in pending {
            let _ = tx.send(Err(RpcError::internal("connection closed during sampling")));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
