// SPDX-License-Identifier: MIT
// roots/list — the current set of filesystem roots.

use std::sync::Arc;

use serde_json::Value;

use super::to_result;
use crate::protocol::messages::ListRootsResult;
use crate::protocol::RpcError;
use crate::ServerContext;

pub fn list(ctx: &Arc<ServerContext>) -> Result<Value, RpcError> {
    to_result(&ListRootsResult {
        roots: ctx.roots.list(),
    })
}
