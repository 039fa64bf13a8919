// SPDX-License-Identifier: MIT
// Message registry: the static table of recognized methods, their direction,
// and their required parameter fields. Built once at startup; connections
// never mutate it.

use std::collections::HashMap;

use serde_json::Value;

use super::RpcError;

/// Whether a method is called as a request (has an id) or a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Request,
    Notification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToServer,
    /// Only ever sent by the server; inbound requests for it are rejected.
    ServerToClient,
}

#[derive(Debug, Clone)]
pub struct MethodSpec {
    pub method: &'static str,
    pub kind: MethodKind,
    pub direction: Direction,
    /// Top-level params fields that must be present and non-null.
    pub required: &'static [&'static str],
    /// Fields that, when present, must be non-empty strings.
    pub string_fields: &'static [&'static str],
}

pub struct MethodRegistry {
    methods: HashMap<&'static str, MethodSpec>,
}

impl MethodRegistry {
    /// The full method table from the protocol definition.
    pub fn standard() -> Self {
        use Direction::*;
        use MethodKind::*;

        const TABLE: &[MethodSpec] = &[
            MethodSpec {
                method: "initialize",
                kind: Request,
                direction: ClientToServer,
                required: &["protocolVersion", "capabilities", "clientInfo"],
                string_fields: &["protocolVersion"],
            },
            MethodSpec {
                method: "initialized",
                kind: Notification,
                direction: ClientToServer,
                required: &[],
                string_fields: &[],
            },
            MethodSpec {
                method: "ping",
                kind: Request,
                direction: ClientToServer,
                required: &[],
                string_fields: &[],
            },
            MethodSpec {
                method: "cancel",
                kind: Notification,
                direction: ClientToServer,
                required: &["requestId"],
                string_fields: &[],
            },
            MethodSpec {
                method: "tools/list",
                kind: Request,
                direction: ClientToServer,
                required: &[],
                string_fields: &[],
            },
            MethodSpec {
                method: "tools/call",
                kind: Request,
                direction: ClientToServer,
                required: &["name"],
                string_fields: &["name"],
            },
            MethodSpec {
                method: "resources/list",
                kind: Request,
                direction: ClientToServer,
                required: &[],
                string_fields: &[],
            },
            MethodSpec {
                method: "resources/read",
                kind: Request,
                direction: ClientToServer,
                required: &["uri"],
                string_fields: &["uri"],
            },
            MethodSpec {
                method: "resources/subscribe",
                kind: Request,
                direction: ClientToServer,
                required: &["uri"],
                string_fields: &["uri"],
            },
            MethodSpec {
                method: "resources/unsubscribe",
                kind: Request,
                direction: ClientToServer,
                required: &["uri"],
                string_fields: &["uri"],
            },
            MethodSpec {
                method: "prompts/list",
                kind: Request,
                direction: ClientToServer,
                required: &[],
                string_fields: &[],
            },
            MethodSpec {
                method: "prompts/get",
                kind: Request,
                direction: ClientToServer,
                required: &["name"],
                string_fields: &["name"],
            },
            MethodSpec {
                method: "completion/complete",
                kind: Request,
                direction: ClientToServer,
                required: &["ref", "argument"],
                string_fields: &[],
            },
            MethodSpec {
                method: "logging/setLevel",
                kind: Request,
                direction: ClientToServer,
                required: &["level"],
                string_fields: &["level"],
            },
            MethodSpec {
                method: "roots/list",
                kind: Request,
                direction: ClientToServer,
                required: &[],
                string_fields: &[],
            },
            MethodSpec {
                method: "sampling/createMessage",
                kind: Request,
                direction: ServerToClient,
                required: &["messages", "maxTokens"],
                string_fields: &[],
            },
        ];

        let methods = TABLE.iter().map(|s| (s.method, s.clone())).collect();
        Self { methods }
    }

    pub fn lookup(&self, method: &str) -> Option<&MethodSpec> {
        self.methods.get(method)
    }

    /// Shape-check params against the method table entry: required fields
    /// present and non-null, string-typed fields actually strings and
    /// non-empty. Typed deserialization in the handlers does the rest.
    pub fn validate_params(
        &self,
        spec: &MethodSpec,
        params: Option<&Value>,
    ) -> Result<(), RpcError> {
        if spec.required.is_empty() {
            return Ok(());
        }

        let obj = match params {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => {
                return Err(RpcError::invalid_params(format!(
                    "{} requires params",
                    spec.method
                )))
            }
            Some(_) => {
                return Err(RpcError::invalid_params(format!(
                    "{} params must be an object",
                    spec.method
                )))
            }
        };

        for field in spec.required {
            match obj.get(*field) {
                None | Some(Value::Null) => {
                    return Err(RpcError::invalid_params(format!(
                        "missing required field '{field}'"
                    )))
                }
                Some(_) => {}
            }
        }

        for field in spec.string_fields {
            if let Some(value) = obj.get(*field) {
                match value.as_str() {
                    Some(s) if !s.is_empty() => {}
                    Some(_) => {
                        return Err(RpcError::invalid_params(format!(
                            "field '{field}' must be non-empty"
                        )))
                    }
                    None => {
                        return Err(RpcError::invalid_params(format!(
                            "field '{field}' must be a string"
                        )))
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_table_covers_all_method_families() {
        let reg = MethodRegistry::standard();
        for method in [
            "initialize",
            "initialized",
            "ping",
            "cancel",
            "tools/list",
            "tools/call",
            "resources/list",
            "resources/read",
            "resources/subscribe",
            "resources/unsubscribe",
            "prompts/list",
            "prompts/get",
            "completion/complete",
            "logging/setLevel",
            "roots/list",
            "sampling/createMessage",
        ] {
            assert!(reg.lookup(method).is_some(), "missing {method}");
        }
        assert!(reg.lookup("tools/delete").is_none());
    }

    #[test]
    fn tools_call_requires_non_empty_name() {
        let reg = MethodRegistry::standard();
        let spec = reg.lookup("tools/call").unwrap();

        assert!(reg.validate_params(spec, None).is_err());
        assert!(reg
            .validate_params(spec, Some(&json!({ "name": "" })))
            .is_err());
        assert!(reg
            .validate_params(spec, Some(&json!({ "name": 5 })))
            .is_err());
        assert!(reg
            .validate_params(spec, Some(&json!({ "name": "echo" })))
            .is_ok());
    }

    #[test]
    fn ping_accepts_missing_params() {
        let reg = MethodRegistry::standard();
        let spec = reg.lookup("ping").unwrap();
        assert!(reg.validate_params(spec, None).is_ok());
        assert!(reg
            .validate_params(spec, Some(&json!({ "timestamp": 12 })))
            .is_ok());
    }

    #[test]
    fn initialize_rejects_null_capabilities() {
        let reg = MethodRegistry::standard();
        let spec = reg.lookup("initialize").unwrap();
        let err = reg
            .validate_params(
                spec,
                Some(&json!({
                    "protocolVersion": "0.1.0",
                    "capabilities": null,
                    "clientInfo": { "name": "c", "version": "1" }
                })),
            )
            .unwrap_err();
        assert_eq!(err.code, super::super::INVALID_PARAMS);
    }

    #[test]
    fn sampling_is_server_to_client() {
        let reg = MethodRegistry::standard();
        let spec = reg.lookup("sampling/createMessage").unwrap();
        assert_eq!(spec.direction, Direction::ServerToClient);
    }
}
