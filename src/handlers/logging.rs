// SPDX-License-Identifier: MIT
// logging/setLevel — mutates the process-wide client log level.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use super::parse_params;
use crate::protocol::messages::SetLevelParams;
use crate::protocol::RpcError;
use crate::ServerContext;

pub fn set_level(params: Option<Value>, ctx: &Arc<ServerContext>) -> Result<Value, RpcError> {
    // An unknown level fails typed deserialization → invalid params.
    let params: SetLevelParams = parse_params(params)?;
    ctx.log_level.set(params.level);
    info!(level = params.level.as_str(), "client log level changed");
    Ok(json!({}))
}
