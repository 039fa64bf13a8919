// SPDX-License-Identifier: MIT
// Connection manager: accepts transports, tracks live connections, closes
// them (individually, en masse, or by idle sweep), and broadcasts
// notifications to every Ready connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{emitter, Connection, ConnectionState};
use crate::dispatch::cancel::CancellationRegistry;
use crate::subscriptions::SubscriptionManager;
use crate::transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    #[error("connection limit reached ({0})")]
    MaxConnections(usize),
}

pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,
    max_connections: usize,
    idle_timeout: Duration,
    cancels: Arc<CancellationRegistry>,
    subscriptions: Arc<SubscriptionManager>,
}

impl ConnectionManager {
    pub fn new(
        max_connections: usize,
        idle_timeout: Duration,
        cancels: Arc<CancellationRegistry>,
        subscriptions: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            max_connections,
            idle_timeout,
            cancels,
            subscriptions,
        }
    }

    // ─── Accept / lookup ────────────────────────────────────────────────────

    /// Register a new transport. Rejects immediately once the configured
    /// connection limit is reached.
    pub async fn accept(
        &self,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<Connection>, AcceptError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.max_connections {
            return Err(AcceptError::MaxConnections(self.max_connections));
        }

        let id = Uuid::new_v4();
        let conn = Arc::new(Connection::new(id, transport));
        // Accept complete: Connecting → Connected, timestamps recorded.
        let _ = conn.transition(ConnectionState::Connected);
        conn.touch();
        connections.insert(id, conn.clone());
        info!(conn = %id, peer = %conn.peer(), total = connections.len(), "connection established");
        Ok(conn)
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.read().await.get(&id).cloned()
    }

    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }

    // ─── Close ──────────────────────────────────────────────────────────────

    /// Close one connection: cancel its in-flight requests, drop its
    /// subscriptions, fail its pending sampling calls, close the transport.
    pub async fn close(&self, id: Uuid, reason: &str) {
        let conn = { self.connections.write().await.remove(&id) };
        let Some(conn) = conn else { return };

        let _ = conn.transition(ConnectionState::Closing);
        let cancelled = self.cancels.cancel_all(id, reason);
        self.subscriptions.remove_connection(id);
        conn.sampling.abort_all();
        conn.transport().close().await;
        let _ = conn.transition(ConnectionState::Closed);
        info!(conn = %id, reason, cancelled, "connection closed");
    }

    pub async fn close_all(&self, reason: &str) {
        let ids: Vec<Uuid> = { self.connections.read().await.keys().copied().collect() };
        for id in ids {
            self.close(id, reason).await;
        }
    }

    // ─── Broadcast ──────────────────────────────────────────────────────────

    /// Send a notification to every Ready connection, optionally excluding
    /// one id. Iterates a snapshot so a concurrent close cannot fault the
    /// walk. Returns the delivery count.
    pub async fn broadcast(
        &self,
        method: &str,
        params: serde_json::Value,
        exclude: Option<Uuid>,
    ) -> usize {
        let snapshot: Vec<Arc<Connection>> =
            { self.connections.read().await.values().cloned().collect() };

        let mut delivered = 0;
        for conn in snapshot {
            if Some(conn.id()) == exclude || !conn.is_ready() {
                continue;
            }
            match emitter::notify(&conn, method, params.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(conn = %conn.id(), method, err = %e, "broadcast delivery failed");
                }
            }
        }
        delivered
    }

    /// Snapshot of Ready connections, for subsystems that fan out directly.
    pub async fn ready_connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .await
            .values()
            .filter(|c| c.is_ready())
            .cloned()
            .collect()
    }

    // ─── Idle sweep ─────────────────────────────────────────────────────────

    /// Periodically close connections idle past the configured timeout.
    pub fn spawn_idle_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self;
        let period = manager
            .idle_timeout
            .checked_div(4)
            .unwrap_or(Duration::from_secs(30))
            .clamp(Duration::from_secs(1), Duration::from_secs(60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                manager.sweep_idle().await;
            }
        })
    }

    pub async fn sweep_idle(&self) -> usize {
        let stale: Vec<Uuid> = {
            self.connections
                .read()
                .await
                .values()
                .filter(|c| c.idle_for() >= self.idle_timeout)
                .map(|c| c.id())
                .collect()
        };
        for id in &stale {
            debug!(conn = %id, "closing idle connection");
            self.close(*id, "idle").await;
        }
        stale.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResponseCache;

    struct NullTransport;

    #[async_trait::async_trait]
    impl Transport for NullTransport {
        async fn receive(&self) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
        async fn send(&self, _frame: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn close(&self) {}
    }

    fn manager(max: usize, idle: Duration) -> Arc<ConnectionManager> {
        let cache = Arc::new(ResponseCache::new(None, 0.05, Duration::from_secs(300)));
        Arc::new(ConnectionManager::new(
            max,
            idle,
            Arc::new(CancellationRegistry::new()),
            Arc::new(SubscriptionManager::new(cache)),
        ))
    }

    #[tokio::test]
    async fn accept_enforces_connection_limit() {
        let mgr = manager(2, Duration::from_secs(300));
        mgr.accept(Arc::new(NullTransport)).await.unwrap();
        mgr.accept(Arc::new(NullTransport)).await.unwrap();
        let err = mgr.accept(Arc::new(NullTransport)).await.unwrap_err();
        assert!(matches!(err, AcceptError::MaxConnections(2)));
    }

    #[tokio::test]
    async fn close_removes_and_marks_closed() {
        let mgr = manager(8, Duration::from_secs(300));
        let conn = mgr.accept(Arc::new(NullTransport)).await.unwrap();
        assert_eq!(mgr.count().await, 1);

        mgr.close(conn.id(), "test").await;
        assert_eq!(mgr.count().await, 0);
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(mgr.get(conn.id()).await.is_none());
    }

    #[tokio::test]
    async fn idle_sweep_closes_stale_connections() {
        let mgr = manager(8, Duration::from_millis(10));
        let conn = mgr.accept(Arc::new(NullTransport)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        let swept = mgr.sweep_idle().await;
        assert_eq!(swept, 1);
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn broadcast_skips_non_ready_connections() {
        let mgr = manager(8, Duration::from_secs(300));
        let a = mgr.accept(Arc::new(NullTransport)).await.unwrap();
        let _b = mgr.accept(Arc::new(NullTransport)).await.unwrap();
        let _ = a.transition(ConnectionState::Ready);

        let delivered = mgr
            .broadcast("notifications/message", serde_json::json!({}), None)
            .await;
        assert_eq!(delivered, 1);
    }
}
