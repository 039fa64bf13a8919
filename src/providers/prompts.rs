// SPDX-License-Identifier: MIT
// Prompt provider contract and registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::protocol::messages::GetPromptResult;
use crate::protocol::types::PromptDescriptor;

#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<PromptDescriptor>>;

    /// Render a prompt. `Ok(None)` means this provider does not recognize
    /// the name and the next one is consulted.
    async fn get(
        &self,
        name: &str,
        arguments: &HashMap<String, String>,
    ) -> anyhow::Result<Option<GetPromptResult>>;
}

#[derive(Default)]
pub struct PromptRegistry {
    providers: RwLock<Vec<Arc<dyn PromptProvider>>>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn PromptProvider>) {
        self.providers.write().unwrap().push(provider);
    }

    pub fn providers(&self) -> Vec<Arc<dyn PromptProvider>> {
        self.providers.read().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().unwrap().is_empty()
    }
}
