// SPDX-License-Identifier: MIT
// Filesystem roots exposed via `roots/list`.

use std::sync::RwLock;

use crate::protocol::types::Root;

#[derive(Default)]
pub struct RootRegistry {
    roots: RwLock<Vec<Root>>,
}

impl RootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root. Re-adding a URI updates its display name.
    pub fn register(&self, uri: impl Into<String>, name: Option<String>) {
        let uri = uri.into();
        let mut roots = self.roots.write().unwrap();
        if let Some(existing) = roots.iter_mut().find(|r| r.uri == uri) {
            existing.name = name;
        } else {
            roots.push(Root { uri, name });
        }
    }

    pub fn list(&self) -> Vec<Root> {
        self.roots.read().unwrap().clone()
    }
}
