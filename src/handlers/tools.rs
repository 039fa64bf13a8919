// SPDX-License-Identifier: MIT
// tools/list and tools/call.

use std::sync::Arc;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use super::{cache_error_to_rpc, parse_params, to_result};
use crate::connection::Connection;
use crate::protocol::messages::{CallToolParams, CallToolResult, ListToolsResult};
use crate::protocol::{DomainError, RpcError};
use crate::providers::tools::ProgressReporter;
use crate::providers::ToolContext;
use crate::ServerContext;

pub fn list(ctx: &Arc<ServerContext>) -> Result<Value, RpcError> {
    to_result(&ListToolsResult {
        tools: ctx.tools.descriptors(),
    })
}

pub async fn call(
    params: Option<Value>,
    ctx: &Arc<ServerContext>,
    conn: &Arc<Connection>,
    token: &CancellationToken,
) -> Result<Value, RpcError> {
    let params: CallToolParams = parse_params(params)?;
    let tool = ctx
        .tools
        .get(&params.name)
        .ok_or_else(|| DomainError::ToolNotFound(params.name.clone()).to_rpc_error())?;

    let arguments = params.arguments.unwrap_or_default();
    let tool_ctx = ToolContext {
        connection_id: conn.id(),
        cancel: token.clone(),
        progress: params
            .meta
            .and_then(|m| m.progress_token)
            .map(|t| ProgressReporter::new(conn.clone(), t)),
    };

    // Cacheable tools go through the single-flight cache, keyed by the
    // argument fingerprint. Everything else executes directly.
    match tool.cache_options() {
        Some(options) => {
            let key = format!("tool:{}:{}", params.name, fingerprint(&arguments));
            let name = params.name.clone();
            ctx.cache
                .get_or_compute(&key, options, async move {
                    let result = tool.execute(arguments, tool_ctx).await.map_err(|e| {
                        anyhow::Error::new(DomainError::ToolExecution {
                            tool: name,
                            cause: e,
                        })
                    })?;
                    Ok(serde_json::to_value(&result)?)
                })
                .await
                .map_err(cache_error_to_rpc)
        }
        None => {
            let result = tool.execute(arguments, tool_ctx).await.map_err(|e| {
                DomainError::ToolExecution {
                    tool: params.name.clone(),
                    cause: e,
                }
                .to_rpc_error()
            })?;
            to_result::<CallToolResult>(&result)
        }
    }
}

/// SHA-256 over the serialized arguments; the cache key must be a stable
/// UTF-8 fingerprint, not the raw (possibly huge) argument object.
fn fingerprint(arguments: &serde_json::Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(Value::Object(arguments.clone()).to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fingerprint_is_deterministic_and_argument_sensitive() {
        let a: serde_json::Map<String, Value> =
            serde_json::from_value(json!({ "x": 1 })).unwrap();
        let b: serde_json::Map<String, Value> =
            serde_json::from_value(json!({ "x": 2 })).unwrap();
        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
