// SPDX-License-Identifier: MIT
// The Tool contract and registry.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::cache::CacheOptions;
use crate::connection::{emitter, Connection};
use crate::protocol::messages::{CallToolResult, ProgressParams, ProgressToken};
use crate::protocol::types::ToolDescriptor;

/// Execution context handed to every tool call.
pub struct ToolContext {
    pub connection_id: Uuid,
    /// Flips when the client cancels the request. Long-running tools should
    /// poll this at I/O boundaries; the dispatcher also drops the handler
    /// future at its next await once the token fires.
    pub cancel: CancellationToken,
    /// Present when the caller supplied `_meta.progressToken`.
    pub progress: Option<ProgressReporter>,
}

/// Sends `notifications/progress` correlated to the originating request.
#[derive(Clone)]
pub struct ProgressReporter {
    conn: Arc<Connection>,
    token: ProgressToken,
}

impl ProgressReporter {
    pub fn new(conn: Arc<Connection>, token: ProgressToken) -> Self {
        Self { conn, token }
    }

    pub async fn report(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let params = ProgressParams {
            progress_token: self.token.clone(),
            progress,
            total,
            message,
        };
        if let Err(e) = emitter::progress(&self.conn, &params).await {
            warn!(conn = %self.conn.id(), err = %e, "progress notification failed");
        }
    }
}

/// A callable function exposed over `tools/call`.
///
/// Tool-level failures should be returned as `CallToolResult::error(..)` so
/// the client sees `isError = true`; an `Err` from `execute` is treated as an
/// unexpected fault and becomes a protocol error.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the arguments, emitted verbatim in `tools/list`.
    fn input_schema(&self) -> Value;
    /// Opt-in result caching. `None` (the default) means the call may have
    /// side effects and is never cached.
    fn cache_options(&self) -> Option<CacheOptions> {
        None
    }
    async fn execute(
        &self,
        arguments: serde_json::Map<String, Value>,
        ctx: ToolContext,
    ) -> anyhow::Result<CallToolResult>;
}

/// Startup-populated tool catalogue. Replacing a name logs and wins.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<Vec<Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().unwrap();
        if let Some(existing) = tools.iter_mut().find(|t| t.name() == tool.name()) {
            warn!(tool = tool.name(), "replacing registered tool");
            *existing = tool;
        } else {
            tools.push(tool);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .unwrap()
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .read()
            .unwrap()
            .iter()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: Some(t.description().to_string()),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo the input back"
        }
        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(
            &self,
            arguments: serde_json::Map<String, Value>,
            _ctx: ToolContext,
        ) -> anyhow::Result<CallToolResult> {
            Ok(CallToolResult::text(
                Value::Object(arguments).to_string(),
            ))
        }
    }

    #[test]
    fn register_and_lookup() {
        let reg = ToolRegistry::new();
        assert!(reg.is_empty());
        reg.register(Arc::new(EchoTool));
        assert!(reg.get("echo").is_some());
        assert!(reg.get("missing").is_none());

        let descriptors = reg.descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "echo");
        assert_eq!(descriptors[0].input_schema, json!({ "type": "object" }));
    }

    #[test]
    fn re_registering_replaces_in_place() {
        let reg = ToolRegistry::new();
        reg.register(Arc::new(EchoTool));
        reg.register(Arc::new(EchoTool));
        assert_eq!(reg.descriptors().len(), 1);
    }
}
