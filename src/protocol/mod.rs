// SPDX-License-Identifier: MIT
// JSON-RPC 2.0 / MCP protocol layer: wire codec, typed messages, method
// registry, version negotiation, and the error taxonomy shared by every
// handler.

pub mod jsonrpc;
pub mod messages;
pub mod registry;
pub mod types;
pub mod version;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ─── Error codes ─────────────────────────────────────────────────────────────

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// Connection has not completed the `initialize` handshake.
pub const SERVER_NOT_INITIALIZED: i32 = -32002;
/// In-flight request was cancelled before the handler produced a result.
pub const REQUEST_CANCELLED: i32 = -32800;

// ─── RpcError ────────────────────────────────────────────────────────────────

/// JSON-RPC error object as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, detail)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, format!("invalid params: {}", detail.into()))
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, detail)
    }

    /// -32002 — connection is not Ready; only `initialize` and `ping` may run.
    pub fn not_initialized() -> Self {
        Self::new(
            SERVER_NOT_INITIALIZED,
            "server not initialized — send initialize first",
        )
    }

    pub fn cancelled() -> Self {
        Self::new(REQUEST_CANCELLED, "cancelled")
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

// ─── Domain errors ───────────────────────────────────────────────────────────

/// Errors raised by the method handlers and their collaborators.
///
/// These are not protocol violations: they map to -32603 with a structured
/// `data` object carrying `kind` plus per-variant details, so clients can
/// distinguish e.g. an unknown tool from a genuine server fault.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("prompt not found: {0}")]
    PromptNotFound(String),
    #[error("no provider handled resource: {0}")]
    ResourceNotFound(String),
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
    #[error("client did not advertise the sampling capability")]
    SamplingUnsupported,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("tool '{tool}' failed: {cause}")]
    ToolExecution { tool: String, cause: anyhow::Error },
}

impl DomainError {
    /// Stable discriminator carried in `error.data.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::ToolNotFound(_) => "ToolNotFound",
            DomainError::PromptNotFound(_) => "PromptNotFound",
            DomainError::ResourceNotFound(_) => "ResourceNotFound",
            DomainError::UnsupportedVersion(_) => "UnsupportedVersion",
            DomainError::SamplingUnsupported => "SamplingUnsupported",
            DomainError::Unauthorized(_) => "Unauthorized",
            DomainError::ToolExecution { .. } => "ToolExecutionError",
        }
    }

    /// The wire mapping: -32603 plus the structured `data` payload.
    pub fn to_rpc_error(&self) -> RpcError {
        RpcError::new(INTERNAL_ERROR, self.to_string()).with_data(self.data())
    }

    fn data(&self) -> Value {
        match self {
            DomainError::ToolNotFound(name) => {
                json!({ "kind": self.kind(), "toolName": name })
            }
            DomainError::PromptNotFound(name) => {
                json!({ "kind": self.kind(), "promptName": name })
            }
            DomainError::ResourceNotFound(uri) => {
                json!({ "kind": self.kind(), "uri": uri })
            }
            DomainError::UnsupportedVersion(requested) => {
                json!({ "kind": self.kind(), "requestedVersion": requested })
            }
            DomainError::ToolExecution { tool, .. } => {
                json!({ "kind": self.kind(), "toolName": tool })
            }
            DomainError::SamplingUnsupported | DomainError::Unauthorized(_) => {
                json!({ "kind": self.kind() })
            }
        }
    }
}

impl From<DomainError> for RpcError {
    fn from(err: DomainError) -> Self {
        err.to_rpc_error()
    }
}
