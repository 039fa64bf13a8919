// SPDX-License-Identifier: MIT
// Wire codec: one transport frame in, one classified JSON-RPC message out.
//
// The codec is strict. Batch arrays, unknown top-level fields, a null `id`
// on a request, and a response carrying both `result` and `error` are all
// rejected before anything reaches the dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{RpcError, INVALID_REQUEST, PARSE_ERROR};

pub const JSONRPC_VERSION: &str = "2.0";

// ─── Request id ──────────────────────────────────────────────────────────────

/// JSON-RPC request id — string or integer, unique per connection while the
/// request is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_owned())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

// ─── Classified messages ─────────────────────────────────────────────────────

/// An inbound request: non-null `id`, non-empty `method`.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Option<Value>,
}

/// An inbound notification: a request shape with no `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Option<Value>,
}

/// One decoded frame, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    /// Successful response to a server-initiated request.
    Response { id: RequestId, result: Value },
    /// Error response. `id` may be absent when the peer could not read ours.
    Error {
        id: Option<RequestId>,
        error: RpcError,
    },
}

// ─── Decode ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl CodecError {
    pub fn code(&self) -> i32 {
        match self {
            CodecError::Parse(_) => PARSE_ERROR,
            CodecError::Invalid(_) => INVALID_REQUEST,
        }
    }

    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            CodecError::Parse(_) => RpcError::new(PARSE_ERROR, "parse error"),
            CodecError::Invalid(detail) => RpcError::new(INVALID_REQUEST, detail.clone()),
        }
    }
}

/// The only members a frame may carry. Anything else is rejected.
const KNOWN_FIELDS: &[&str] = &["jsonrpc", "id", "method", "params", "result", "error"];

#[derive(Deserialize)]
struct RawError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

fn invalid(detail: impl Into<String>) -> CodecError {
    CodecError::Invalid(detail.into())
}

fn decode_id(id: Value) -> Result<RequestId, CodecError> {
    match id {
        Value::String(s) => Ok(RequestId::String(s)),
        Value::Number(n) => n
            .as_i64()
            .map(RequestId::Number)
            .ok_or_else(|| invalid("request id must be a string or an integer")),
        Value::Null => Err(invalid("request id must not be null")),
        _ => Err(invalid("request id must be a string or an integer")),
    }
}

/// Decode and classify one text frame.
///
/// Classification works on the raw map because absence and `null` mean
/// different things for `id`: a request id may not be null, while a
/// notification omits the member entirely.
pub fn decode(frame: &str) -> Result<Message, CodecError> {
    let value: Value = serde_json::from_str(frame)?;

    // Structural errors past this point are invalid-request, not parse errors.
    let obj = match value {
        Value::Array(_) => return Err(invalid("batch requests are not supported")),
        Value::Object(obj) => obj,
        _ => return Err(invalid("message must be a JSON object")),
    };

    if let Some(unknown) = obj.keys().find(|k| !KNOWN_FIELDS.contains(&k.as_str())) {
        return Err(invalid(format!("unknown field '{unknown}'")));
    }
    if obj.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(invalid("jsonrpc must be \"2.0\""));
    }

    let id = obj.get("id").cloned();
    let params = obj.get("params").cloned();
    let result = obj.get("result").cloned();
    let error = obj.get("error").cloned();

    if let Some(method) = obj.get("method") {
        let method = method
            .as_str()
            .ok_or_else(|| invalid("method must be a string"))?
            .to_string();
        if method.is_empty() {
            return Err(invalid("method must be non-empty"));
        }
        if result.is_some() || error.is_some() {
            return Err(invalid("request must not carry result or error"));
        }
        match &params {
            None | Some(Value::Object(_)) | Some(Value::Array(_)) | Some(Value::Null) => {}
            Some(_) => return Err(invalid("params must be an object, array, or null")),
        }
        return match id {
            None => Ok(Message::Notification(Notification { method, params })),
            Some(id) => Ok(Message::Request(Request {
                id: decode_id(id)?,
                method,
                params,
            })),
        };
    }

    // No method: must be a response, with exactly one of result / error.
    match (result, error) {
        (Some(result), None) => {
            let id = id.ok_or_else(|| invalid("response must carry an id"))?;
            Ok(Message::Response {
                id: decode_id(id)?,
                result,
            })
        }
        (None, Some(error)) => {
            let id = match id {
                None | Some(Value::Null) => None,
                Some(other) => Some(decode_id(other)?),
            };
            let raw: RawError =
                serde_json::from_value(error).map_err(|e| invalid(e.to_string()))?;
            let code = i32::try_from(raw.code).map_err(|_| invalid("error code out of range"))?;
            Ok(Message::Error {
                id,
                error: RpcError {
                    code,
                    message: raw.message,
                    data: raw.data,
                },
            })
        }
        (Some(_), Some(_)) => Err(invalid("response carries both result and error")),
        (None, None) => Err(invalid("message has neither method nor result/error")),
    }
}

// ─── Encode ──────────────────────────────────────────────────────────────────

pub fn encode_response(id: &RequestId, result: &Value) -> String {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }).to_string()
}

pub fn encode_error(id: Option<&RequestId>, error: &RpcError) -> String {
    let id = id.map_or(Value::Null, |i| json!(i));
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error }).to_string()
}

pub fn encode_notification(method: &str, params: Value) -> String {
    json!({ "jsonrpc": JSONRPC_VERSION, "method": method, "params": params }).to_string()
}

pub fn encode_request(id: &RequestId, method: &str, params: Value) -> String {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "method": method, "params": params })
        .to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request() {
        let msg = decode(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).unwrap();
        match msg {
            Message::Request(req) => {
                assert_eq!(req.id, RequestId::Number(1));
                assert_eq!(req.method, "ping");
                assert!(req.params.is_none());
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn classifies_notification() {
        let msg = decode(r#"{"jsonrpc":"2.0","method":"initialized"}"#).unwrap();
        assert!(matches!(msg, Message::Notification(n) if n.method == "initialized"));
    }

    #[test]
    fn classifies_string_id() {
        let msg = decode(r#"{"jsonrpc":"2.0","id":"abc","method":"ping"}"#).unwrap();
        assert!(matches!(
            msg,
            Message::Request(req) if req.id == RequestId::String("abc".into())
        ));
    }

    #[test]
    fn classifies_response_and_error() {
        let msg = decode(r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#).unwrap();
        assert!(matches!(msg, Message::Response { id, .. } if id == RequestId::Number(7)));

        let msg =
            decode(r#"{"jsonrpc":"2.0","id":7,"error":{"code":-32603,"message":"x"}}"#).unwrap();
        assert!(matches!(msg, Message::Error { error, .. } if error.code == -32603));
    }

    #[test]
    fn rejects_batch() {
        let err = decode(r#"[{"jsonrpc":"2.0","id":1,"method":"ping"}]"#).unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);
    }

    #[test]
    fn rejects_unknown_top_level_field() {
        let err = decode(r#"{"jsonrpc":"2.0","id":1,"method":"ping","extra":1}"#).unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);
    }

    #[test]
    fn rejects_null_request_id() {
        let err = decode(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);
    }

    #[test]
    fn rejects_missing_or_wrong_version() {
        assert!(decode(r#"{"id":1,"method":"ping"}"#).is_err());
        assert!(decode(r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#).is_err());
    }

    #[test]
    fn rejects_scalar_params() {
        let err = decode(r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":5}"#).unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);
    }

    #[test]
    fn rejects_both_result_and_error() {
        let err = decode(
            r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":1,"message":"x"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), INVALID_REQUEST);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = decode("{not json").unwrap_err();
        assert_eq!(err.code(), PARSE_ERROR);
    }

    #[test]
    fn encode_error_with_null_id() {
        let s = encode_error(None, &RpcError::new(PARSE_ERROR, "parse error"));
        let v: Value = serde_json::from_str(&s).unwrap();
        assert!(v["id"].is_null());
        assert_eq!(v["error"]["code"], PARSE_ERROR);
    }
}
