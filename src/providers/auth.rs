// SPDX-License-Identifier: MIT
// Authentication hook, consulted during the initialize handshake.

use async_trait::async_trait;

use crate::protocol::messages::InitializeParams;

/// Verifies a connecting client before it can reach Ready. The core exposes
/// the hook only — credential formats and policies belong to the
/// implementation. An `Err` rejects the handshake with an `Unauthorized`
/// domain error.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, params: &InitializeParams) -> anyhow::Result<()>;
}
