// SPDX-License-Identifier: MIT
// Cancellation registry: one live record per (connection, request id), each
// carrying the CancellationToken the handler observes cooperatively.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::protocol::jsonrpc::RequestId;

#[derive(Debug, thiserror::Error)]
#[error("request id {id} already in flight on connection {conn}")]
pub struct DuplicateRequest {
    pub conn: Uuid,
    pub id: RequestId,
}

struct InFlight {
    method: String,
    started_at: Instant,
    token: CancellationToken,
}

#[derive(Default)]
pub struct CancellationRegistry {
    inflight: Mutex<HashMap<(Uuid, RequestId), InFlight>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the in-flight record and hand back its token. A second
    /// register for a live (connection, id) pair is rejected — request ids
    /// must be unique per connection while in flight.
    pub fn register(
        &self,
        conn: Uuid,
        id: RequestId,
        method: &str,
    ) -> Result<CancellationToken, DuplicateRequest> {
        let mut inflight = self.inflight.lock().unwrap();
        if inflight.contains_key(&(conn, id.clone())) {
            return Err(DuplicateRequest { conn, id });
        }
        let token = CancellationToken::new();
        inflight.insert(
            (conn, id),
            InFlight {
                method: method.to_string(),
                started_at: Instant::now(),
                token: token.clone(),
            },
        );
        Ok(token)
    }

    /// Signal the token for a live record. Returns false when nothing is in
    /// flight under that id — including after `unregister`.
    pub fn cancel(&self, conn: Uuid, id: &RequestId, reason: Option<&str>) -> bool {
        let inflight = self.inflight.lock().unwrap();
        match inflight.get(&(conn, id.clone())) {
            Some(record) => {
                debug!(
                    conn = %conn,
                    request = %id,
                    method = %record.method,
                    reason = reason.unwrap_or("unspecified"),
                    elapsed_ms = record.started_at.elapsed().as_millis() as u64,
                    "cancelling in-flight request"
                );
                record.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn unregister(&self, conn: Uuid, id: &RequestId) {
        self.inflight.lock().unwrap().remove(&(conn, id.clone()));
    }

    pub fn token_for(&self, conn: Uuid, id: &RequestId) -> Option<CancellationToken> {
        self.inflight
            .lock()
            .unwrap()
            .get(&(conn, id.clone()))
            .map(|r| r.token.clone())
    }

    /// Cancel everything in flight on one connection (connection close,
    /// server shutdown). Returns how many requests were signalled.
    pub fn cancel_all(&self, conn: Uuid, reason: &str) -> usize {
        let inflight = self.inflight.lock().unwrap();
        let mut cancelled = 0;
        for ((owner, id), record) in inflight.iter() {
            if *owner == conn {
                debug!(conn = %conn, request = %id, reason, "cancelling on connection close");
                record.token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn contains(&self, conn: Uuid, id: &RequestId) -> bool {
        self.inflight
            .lock()
            .unwrap()
            .contains_key(&(conn, id.clone()))
    }

    pub fn in_flight_count(&self) -> usize {
        self.inflight.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_id_is_rejected_while_in_flight() {
        let reg = CancellationRegistry::new();
        let conn = Uuid::new_v4();
        let id = RequestId::Number(1);

        reg.register(conn, id.clone(), "tools/call").unwrap();
        assert!(reg.register(conn, id.clone(), "tools/call").is_err());

        // The same id on another connection is fine.
        reg.register(Uuid::new_v4(), id.clone(), "tools/call")
            .unwrap();

        // And reusable after the first completes.
        reg.unregister(conn, &id);
        reg.register(conn, id, "tools/call").unwrap();
    }

    #[test]
    fn cancel_signals_token_and_reports_liveness() {
        let reg = CancellationRegistry::new();
        let conn = Uuid::new_v4();
        let id = RequestId::String("r-1".into());

        let token = reg.register(conn, id.clone(), "tools/call").unwrap();
        assert!(!token.is_cancelled());
        assert!(reg.cancel(conn, &id, Some("user")));
        assert!(token.is_cancelled());

        reg.unregister(conn, &id);
        assert!(!reg.cancel(conn, &id, None), "cancel after unregister is false");
    }

    #[test]
    fn cancel_all_targets_one_connection() {
        let reg = CancellationRegistry::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let t1 = reg.register(a, RequestId::Number(1), "tools/call").unwrap();
        let t2 = reg.register(a, RequestId::Number(2), "resources/read").unwrap();
        let t3 = reg.register(b, RequestId::Number(1), "tools/call").unwrap();

        assert_eq!(reg.cancel_all(a, "close"), 2);
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
        assert!(!t3.is_cancelled());
    }
}
