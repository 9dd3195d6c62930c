//! Remote-procedure dispatch for offline mode.
//!
//! The hosted backend exposes stored procedures by name; locally each one is a
//! Rust handler registered in an [`RpcRegistry`].

use std::collections::HashMap;

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::error::LocalError;
use crate::error_map;
use crate::request::Response;
use crate::subtree;

/// Named RPC arguments.
pub type RpcParams = Map<String, Value>;

/// A procedure implementation.
pub type RpcHandler = fn(&Connection, &RpcParams) -> Result<Value, LocalError>;

pub const IS_PERSON_IN_SUBTREE: &str = "is_person_in_subtree";

/// One RPC invocation as sent over the wire: `{"function": ..., "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RpcCall {
    pub function: String,
    #[serde(default)]
    pub params: RpcParams,
}

/// Name → handler table.
#[derive(Clone, Default)]
pub struct RpcRegistry {
    handlers: HashMap<String, RpcHandler>,
}

impl std::fmt::Debug for RpcRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("RpcRegistry").field("functions", &names).finish()
    }
}

impl RpcRegistry {
    /// A registry with no procedures.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in procedure.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(IS_PERSON_IN_SUBTREE, is_person_in_subtree);
        registry
    }

    pub fn register(&mut self, name: &str, handler: RpcHandler) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Invokes `function` with `params`. Never fails: errors come back inside
    /// the [`Response`].
    #[instrument(skip(self, conn, params))]
    pub fn invoke(&self, conn: &Connection, function: &str, params: &RpcParams) -> Response {
        let outcome = match self.handlers.get(function) {
            Some(handler) => handler(conn, params),
            None => Err(LocalError::UnknownFunction(function.to_string())),
        };

        match outcome {
            Ok(data) => {
                debug!("rpc completed");
                Response::ok(data)
            }
            Err(err) => {
                let mapped = error_map::map_error(&err);
                warn!(error = %mapped, "rpc failed");
                Response::err(mapped)
            }
        }
    }
}

/// Reads a required string parameter. Absent and null both count as missing;
/// numbers are accepted in their decimal form.
pub fn required_str(params: &RpcParams, function: &'static str, param: &'static str) -> Result<String, LocalError> {
    match params.get(param) {
        None | Some(Value::Null) => Err(LocalError::MissingParameter { function, param }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
    }
}

fn is_person_in_subtree(conn: &Connection, params: &RpcParams) -> Result<Value, LocalError> {
    let root = required_str(params, IS_PERSON_IN_SUBTREE, "root_person_id")?;
    let target = required_str(params, IS_PERSON_IN_SUBTREE, "target_person_id")?;
    subtree::is_person_in_subtree(conn, &root, &target).map(Value::Bool)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::codes;

    fn params(value: Value) -> RpcParams {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn unknown_function_is_named_in_the_error() {
        let conn = Connection::open_in_memory().unwrap();
        let resp = RpcRegistry::with_builtins().invoke(&conn, "get_ancestors", &RpcParams::new());
        let err = resp.error.unwrap();
        assert!(err.has_code(codes::UNKNOWN_FUNCTION));
        assert!(err.message.contains("get_ancestors"));
        assert_eq!(resp.data, Value::Null);
    }

    #[test]
    fn missing_parameter_fails_before_engine_access() {
        // No tables: reaching the engine would produce a different error.
        let conn = Connection::open_in_memory().unwrap();
        let registry = RpcRegistry::with_builtins();

        let resp = registry.invoke(&conn, IS_PERSON_IN_SUBTREE, &params(json!({"root_person_id": "P1"})));
        let err = resp.error.unwrap();
        assert!(err.has_code(codes::INVALID_PARAMETER));
        assert!(err.message.contains("target_person_id"));

        let resp = registry.invoke(
            &conn,
            IS_PERSON_IN_SUBTREE,
            &params(json!({"root_person_id": null, "target_person_id": "P2"})),
        );
        assert!(resp.error.unwrap().message.contains("root_person_id"));
    }

    #[test]
    fn same_person_short_circuits() {
        let conn = Connection::open_in_memory().unwrap();
        let resp = RpcRegistry::with_builtins().invoke(
            &conn,
            IS_PERSON_IN_SUBTREE,
            &params(json!({"root_person_id": "P1", "target_person_id": "P1"})),
        );
        assert_eq!(resp, Response::ok(json!(true)));
    }

    #[test]
    fn custom_handlers_can_be_registered() {
        fn ping(_: &Connection, params: &RpcParams) -> Result<Value, LocalError> {
            Ok(json!({ "pong": required_str(params, "ping", "msg")? }))
        }
        let mut registry = RpcRegistry::new();
        assert!(!registry.contains("ping"));
        registry.register("ping", ping);

        let conn = Connection::open_in_memory().unwrap();
        let resp = registry.invoke(&conn, "ping", &params(json!({"msg": 7})));
        assert_eq!(resp.data, json!({"pong": "7"}));
    }

    #[test]
    fn engine_failures_are_mapped() {
        let conn = Connection::open_in_memory().unwrap();
        let resp = RpcRegistry::with_builtins().invoke(
            &conn,
            IS_PERSON_IN_SUBTREE,
            &params(json!({"root_person_id": "P1", "target_person_id": "P2"})),
        );
        assert!(resp.error.unwrap().has_code(codes::UNDEFINED_TABLE));
    }
}
