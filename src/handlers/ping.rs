// SPDX-License-Identifier: MIT

use serde_json::Value;

use super::{parse_params, to_result};
use crate::protocol::messages::{PingParams, PingResult};
use crate::protocol::RpcError;

/// Liveness check, answerable in any state once Connected. Echoes the
/// client's timestamp when one was supplied.
pub fn handle(params: Option<Value>) -> Result<Value, RpcError> {
    let params: PingParams = parse_params(params)?;
    let result = PingResult {
        server_timestamp: chrono::Utc::now().timestamp_millis(),
        ping_timestamp: params.timestamp,
    };
    to_result(&result)
}
