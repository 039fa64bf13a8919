// SPDX-License-Identifier: MIT
// prompts/list and prompts/get.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::{parse_params, to_result};
use crate::protocol::messages::{GetPromptParams, ListPromptsResult};
use crate::protocol::{DomainError, RpcError};
use crate::ServerContext;

pub async fn list(ctx: &Arc<ServerContext>) -> Result<Value, RpcError> {
    let mut prompts = Vec::new();
    for provider in ctx.prompts.providers() {
        match provider.list().await {
            Ok(mut batch) => prompts.append(&mut batch),
            Err(e) => warn!(err = %e, "prompt provider list failed — skipping"),
        }
    }
    to_result(&ListPromptsResult { prompts })
}

/// First provider recognizing the name wins; none means `PromptNotFound`.
pub async fn get(params: Option<Value>, ctx: &Arc<ServerContext>) -> Result<Value, RpcError> {
    let params: GetPromptParams = parse_params(params)?;
    let arguments: HashMap<String, String> = params.arguments.unwrap_or_default();

    for provider in ctx.prompts.providers() {
        match provider.get(&params.name, &arguments).await {
            Ok(Some(result)) => return to_result(&result),
            Ok(None) => {}
            Err(e) => return Err(RpcError::internal(format!("prompt provider failed: {e}"))),
        }
    }
    Err(DomainError::PromptNotFound(params.name).to_rpc_error())
}
