// SPDX-License-Identifier: MIT
// The initialize handshake: version negotiation, capability exchange, and
// the optional authentication hook. The Ready transition itself happens in
// the dispatcher, after the response is on the wire.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use super::{parse_params, to_result};
use crate::connection::Connection;
use crate::protocol::messages::{InitializeParams, InitializeResult};
use crate::protocol::types::{
    PromptsCapability, ResourcesCapability, ServerCapabilities, ToolsCapability,
};
use crate::protocol::{version, DomainError, RpcError};
use crate::ServerContext;

pub async fn handle(
    params: Option<Value>,
    ctx: &Arc<ServerContext>,
    conn: &Arc<Connection>,
) -> Result<Value, RpcError> {
    let params: InitializeParams = parse_params(params)?;

    // One initialize per connection; a racing second request loses here.
    if !conn.claim_initialize() {
        return Err(RpcError::invalid_request(
            "initialize may only be sent once per connection",
        ));
    }

    if let Some(auth) = ctx.authenticator() {
        auth.authenticate(&params)
            .await
            .map_err(|e| DomainError::Unauthorized(e.to_string()).to_rpc_error())?;
    }

    let negotiated = version::negotiate(&ctx.config.protocol_versions, &params.protocol_version)
        .map_err(|e| e.to_rpc_error())?;

    info!(
        conn = %conn.id(),
        client = %params.client_info.name,
        client_version = %params.client_info.version,
        requested = %params.protocol_version,
        negotiated = %negotiated,
        "initialize handshake"
    );

    conn.complete_handshake(
        negotiated.clone(),
        params.capabilities,
        params.client_info,
    );

    let result = InitializeResult {
        protocol_version: negotiated,
        capabilities: advertised_capabilities(ctx),
        server_info: ctx.server_info.clone(),
        instructions: None,
    };
    to_result(&result)
}

/// Advertise what is actually registered, never a static set.
fn advertised_capabilities(ctx: &ServerContext) -> ServerCapabilities {
    ServerCapabilities {
        tools: (!ctx.tools.is_empty()).then(|| ToolsCapability { list_changed: false }),
        resources: (!ctx.resources.is_empty()).then(|| ResourcesCapability {
            subscribe: true,
            list_changed: false,
        }),
        prompts: (!ctx.prompts.is_empty()).then(|| PromptsCapability { list_changed: false }),
        logging: Some(json!({})),
        completions: ctx.completion_service().map(|_| json!({})),
    }
}
