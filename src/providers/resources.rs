// SPDX-License-Identifier: MIT
// Resource provider contract and registry. Providers are consulted in
// registration order; the first one that handles a URI wins.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::protocol::types::{ResourceContent, ResourceDescriptor};

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Resources this provider can enumerate right now.
    async fn list(&self) -> anyhow::Result<Vec<ResourceDescriptor>>;

    /// Read a URI. `Ok(None)` means not-handled — the next provider in
    /// registration order is consulted.
    async fn read(&self, uri: &str) -> anyhow::Result<Option<Vec<ResourceContent>>>;

    /// Hook invoked when the first observer subscribes to a URI. Providers
    /// that watch external state can start watching here. Default: no-op.
    async fn subscribed(&self, _uri: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Counterpart of `subscribed`. Default: no-op.
    async fn unsubscribed(&self, _uri: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct ResourceRegistry {
    providers: RwLock<Vec<Arc<dyn ResourceProvider>>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn ResourceProvider>) {
        self.providers.write().unwrap().push(provider);
    }

    /// Snapshot in registration order.
    pub fn providers(&self) -> Vec<Arc<dyn ResourceProvider>> {
        self.providers.read().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().unwrap().is_empty()
    }
}
