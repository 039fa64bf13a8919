// SPDX-License-Identifier: MIT
// Resource subscription manager: per-URI observer sets and update fan-out.
//
// The manager owns the authoritative subscription state and holds only weak
// connection references; observers for closed connections are pruned lazily
// when an update touches their URI. Connections never hold subscription
// state of their own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::connection::{emitter, Connection};

pub struct SubscriptionManager {
    cache: Arc<ResponseCache>,
    by_uri: Mutex<HashMap<String, HashMap<Uuid, Weak<Connection>>>>,
}

impl SubscriptionManager {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self {
            cache,
            by_uri: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe a connection to a URI. Idempotent per (connection, uri).
    pub fn subscribe(&self, uri: &str, conn: &Arc<Connection>) {
        let mut by_uri = self.by_uri.lock().unwrap();
        by_uri
            .entry(uri.to_string())
            .or_default()
            .insert(conn.id(), Arc::downgrade(conn));
        debug!(conn = %conn.id(), uri, "subscribed");
    }

    /// Remove the (connection, uri) observer. Succeeds silently when none
    /// existed.
    pub fn unsubscribe(&self, uri: &str, conn_id: Uuid) {
        let mut by_uri = self.by_uri.lock().unwrap();
        if let Some(observers) = by_uri.get_mut(uri) {
            observers.remove(&conn_id);
            if observers.is_empty() {
                by_uri.remove(uri);
            }
        }
    }

    /// Drop every subscription held by one connection. Called from the
    /// connection manager's close path.
    pub fn remove_connection(&self, conn_id: Uuid) {
        let mut by_uri = self.by_uri.lock().unwrap();
        by_uri.retain(|_, observers| {
            observers.remove(&conn_id);
            !observers.is_empty()
        });
    }

    /// Fan out one update for `uri`:
    /// 1. snapshot the observer set (concurrent mutation cannot fault the walk),
    /// 2. deliver `notifications/resources/updated` to each subscriber —
    ///    per-subscriber failures are logged and skipped,
    /// 3. best-effort invalidate the `resource:<uri>` cache entry.
    ///
    /// Returns the number of successful deliveries.
    pub async fn notify(&self, uri: &str) -> usize {
        let observers: Vec<(Uuid, Weak<Connection>)> = {
            let by_uri = self.by_uri.lock().unwrap();
            match by_uri.get(uri) {
                Some(set) => set.iter().map(|(id, w)| (*id, w.clone())).collect(),
                None => Vec::new(),
            }
        };

        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();
        for (conn_id, weak) in observers {
            let Some(conn) = weak.upgrade() else {
                dead.push(conn_id);
                continue;
            };
            match emitter::resource_updated(&conn, uri).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(conn = %conn_id, uri, err = %e, "resource update delivery failed");
                }
            }
        }

        // Lazily prune observers whose connection is gone.
        if !dead.is_empty() {
            let mut by_uri = self.by_uri.lock().unwrap();
            if let Some(set) = by_uri.get_mut(uri) {
                for id in dead {
                    set.remove(&id);
                }
                if set.is_empty() {
                    by_uri.remove(uri);
                }
            }
        }

        self.cache.remove(&format!("resource:{uri}"));
        delivered
    }

    pub fn subscriber_count(&self, uri: &str) -> usize {
        self.by_uri
            .lock()
            .unwrap()
            .get(uri)
            .map_or(0, HashMap::len)
    }

    pub fn subscribed_uris(&self) -> Vec<String> {
        self.by_uri.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use std::time::Duration;

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

    fn manager() -> SubscriptionManager {
        let cache = Arc::new(ResponseCache::new(None, 0.05, Duration::from_secs(300)));
        SubscriptionManager::new(cache)
    }

    fn conn() -> Arc<Connection> {
        Arc::new(Connection::new(Uuid::new_v4(), Arc::new(NullTransport)))
    }

    #[test]
    fn subscribe_is_idempotent_per_connection() {
        let subs = manager();
        let c = conn();
        subs.subscribe("file:///a", &c);
        subs.subscribe("file:///a", &c);
        assert_eq!(subs.subscriber_count("file:///a"), 1);
    }

    #[test]
    fn unsubscribe_missing_pair_is_silent() {
        let subs = manager();
        subs.unsubscribe("file:///a", Uuid::new_v4());
        assert_eq!(subs.subscriber_count("file:///a"), 0);
    }

    #[test]
    fn remove_connection_drops_all_uris() {
        let subs = manager();
        let c = conn();
        subs.subscribe("file:///a", &c);
        subs.subscribe("file:///b", &c);
        subs.remove_connection(c.id());
        assert_eq!(subs.subscriber_count("file:///a"), 0);
        assert_eq!(subs.subscriber_count("file:///b"), 0);
        assert!(subs.subscribed_uris().is_empty());
    }

    #[tokio::test]
    async fn notify_prunes_dead_observers() {
        let subs = manager();
        let c = conn();
        subs.subscribe("file:///a", &c);
        drop(c);
        let delivered = subs.notify("file:///a").await;
        assert_eq!(delivered, 0);
        assert_eq!(subs.subscriber_count("file:///a"), 0);
    }

    #[tokio::test]
    async fn notify_invalidates_resource_cache_entry() {
        let cache = Arc::new(ResponseCache::new(None, 0.05, Duration::from_secs(300)));
        let subs = SubscriptionManager::new(cache.clone());
        cache.set(
            "resource:file:///a",
            serde_json::json!({ "stale": true }),
            crate::cache::CacheOptions::default(),
        );
        subs.notify("file:///a").await;
        assert!(cache.get("resource:file:///a").is_none());
    }
}
