// SPDX-License-Identifier: MIT
// Handler set: one module per method family. Every handler receives its
// dependencies through `ServerContext` — wired explicitly at construction,
// no service container anywhere.

pub mod completion;
pub mod initialize;
pub mod logging;
pub mod ping;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod tools;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::cache::CacheError;
use crate::connection::Connection;
use crate::protocol::{DomainError, RpcError};
use crate::ServerContext;

/// Route one request to its handler. The dispatcher has already enforced
/// lifecycle rules, method existence, and params shape.
pub async fn handle(
    method: &str,
    params: Option<Value>,
    ctx: &Arc<ServerContext>,
    conn: &Arc<Connection>,
    token: &CancellationToken,
) -> Result<Value, RpcError> {
    match method {
        "initialize" => initialize::handle(params, ctx, conn).await,
        "ping" => ping::handle(params),
        "tools/list" => tools::list(ctx),
        "tools/call" => tools::call(params, ctx, conn, token).await,
        "resources/list" => resources::list(ctx).await,
        "resources/read" => resources::read(params, ctx).await,
        "resources/subscribe" => resources::subscribe(params, ctx, conn).await,
        "resources/unsubscribe" => resources::unsubscribe(params, ctx, conn).await,
        "prompts/list" => prompts::list(ctx).await,
        "prompts/get" => prompts::get(params, ctx).await,
        "completion/complete" => completion::complete(params, ctx).await,
        "logging/setLevel" => logging::set_level(params, ctx),
        "roots/list" => roots::list(ctx),
        other => Err(RpcError::method_not_found(other)),
    }
}

/// Deserialize params into the handler's typed shape. Absent and null params
/// are treated as an empty object so all-optional shapes parse.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let value = match params {
        None | Some(Value::Null) => json!({}),
        Some(v) => v,
    };
    serde_json::from_value(value).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Map a cache failure back to the protocol, unwrapping domain errors the
/// producer raised (e.g. ResourceNotFound) so their structured `data`
/// survives the trip through the cache.
pub(crate) fn cache_error_to_rpc(err: CacheError) -> RpcError {
    match err {
        CacheError::Producer(e) => match e.downcast_ref::<DomainError>() {
            Some(domain) => domain.to_rpc_error(),
            None => RpcError::internal(e.to_string()),
        },
        CacheError::InvalidPattern(detail) => RpcError::internal(detail),
        CacheError::Unsupported => RpcError::internal("cache operation unsupported"),
    }
}

/// Serialize a handler result for the wire.
pub(crate) fn to_result<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(format!("encode result: {e}")))
}
