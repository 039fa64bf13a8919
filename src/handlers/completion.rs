// SPDX-License-Identifier: MIT
// completion/complete — argument suggestions, delegated to the installed
// CompletionService.

use std::sync::Arc;

use serde_json::Value;

use super::{parse_params, to_result};
use crate::protocol::messages::{CompleteParams, CompleteResult, Completion};
use crate::protocol::RpcError;
use crate::providers::completion::MAX_COMPLETION_ITEMS;
use crate::ServerContext;

pub async fn complete(params: Option<Value>, ctx: &Arc<ServerContext>) -> Result<Value, RpcError> {
    let params: CompleteParams = parse_params(params)?;

    let Some(service) = ctx.completion_service() else {
        // No service installed: a well-formed empty result, not an error.
        return to_result(&CompleteResult {
            completion: Completion::default(),
        });
    };

    let mut completion = service
        .complete(&params.reference, &params.argument)
        .await
        .map_err(|e| RpcError::internal(format!("completion service failed: {e}")))?;

    if completion.items.len() > MAX_COMPLETION_ITEMS {
        completion.items.truncate(MAX_COMPLETION_ITEMS);
        completion.has_more = true;
    }
    completion.total = completion.total.max(completion.items.len());

    to_result(&CompleteResult { completion })
}
