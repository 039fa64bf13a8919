// SPDX-License-Identifier: MIT
// resources/list, resources/read, resources/subscribe, resources/unsubscribe.
//
// Reads are served through the single-flight cache under `resource:<uri>`;
// the subscription manager invalidates that key when the URI updates.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;

use super::{cache_error_to_rpc, parse_params, to_result};
use crate::cache::CacheOptions;
use crate::connection::Connection;
use crate::protocol::messages::{
    ListResourcesResult, ReadResourceParams, ReadResourceResult, SubscribeParams,
    UnsubscribeParams,
};
use crate::protocol::{DomainError, RpcError};
use crate::ServerContext;

/// Queries every provider and concatenates. A failing provider is logged
/// and skipped; the rest still answer.
pub async fn list(ctx: &Arc<ServerContext>) -> Result<Value, RpcError> {
    let mut resources = Vec::new();
    for provider in ctx.resources.providers() {
        match provider.list().await {
            Ok(mut batch) => resources.append(&mut batch),
            Err(e) => warn!(err = %e, "resource provider list failed — skipping"),
        }
    }
    to_result(&ListResourcesResult { resources })
}

pub async fn read(params: Option<Value>, ctx: &Arc<ServerContext>) -> Result<Value, RpcError> {
    let params: ReadResourceParams = parse_params(params)?;
    let key = format!("resource:{}", params.uri);
    let providers = ctx.resources.providers();
    let uri = params.uri;

    ctx.cache
        .get_or_compute(&key, CacheOptions::default(), async move {
            // First provider that handles the URI wins, in registration order.
            for provider in providers {
                if let Some(contents) = provider.read(&uri).await? {
                    return Ok(serde_json::to_value(ReadResourceResult { contents })?);
                }
            }
            Err(anyhow::Error::new(DomainError::ResourceNotFound(uri)))
        })
        .await
        .map_err(cache_error_to_rpc)
}

/// Idempotent per (connection, uri). The first observer for a URI also
/// pokes the provider hooks so they can start watching.
pub async fn subscribe(
    params: Option<Value>,
    ctx: &Arc<ServerContext>,
    conn: &Arc<Connection>,
) -> Result<Value, RpcError> {
    let params: SubscribeParams = parse_params(params)?;
    let first = ctx.subscriptions.subscriber_count(&params.uri) == 0;
    ctx.subscriptions.subscribe(&params.uri, conn);

    if first {
        for provider in ctx.resources.providers() {
            if let Err(e) = provider.subscribed(&params.uri).await {
                warn!(uri = %params.uri, err = %e, "provider subscribe hook failed");
            }
        }
    }
    Ok(json!({}))
}

/// Removes all observers for (connection, uri); succeeds silently when none
/// existed. The last observer leaving pokes the provider hooks.
pub async fn unsubscribe(
    params: Option<Value>,
    ctx: &Arc<ServerContext>,
    conn: &Arc<Connection>,
) -> Result<Value, RpcError> {
    let params: UnsubscribeParams = parse_params(params)?;
    ctx.subscriptions.unsubscribe(&params.uri, conn.id());

    if ctx.subscriptions.subscriber_count(&params.uri) == 0 {
        for provider in ctx.resources.providers() {
            if let Err(e) = provider.unsubscribed(&params.uri).await {
                warn!(uri = %params.uri, err = %e, "provider unsubscribe hook failed");
            }
        }
    }
    Ok(json!({}))
}
