// SPDX-License-Identifier: MIT
// Completion service contract for `completion/complete`.

use async_trait::async_trait;

use crate::protocol::messages::{Completion, CompletionArgument, CompletionRef};

/// Most items a single `completion/complete` response carries. Services may
/// return more; the handler truncates and sets `hasMore`.
pub const MAX_COMPLETION_ITEMS: usize = 100;

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Suggest values for `argument` of the prompt/resource in `reference`.
    async fn complete(
        &self,
        reference: &CompletionRef,
        argument: &CompletionArgument,
    ) -> anyhow::Result<Completion>;
}
