//! Node: the abstract unit with input/output schemas, properties,
//! per-port handlers, and the execution wrapper (spec.md sections 3, 4.3).
//! Grounded on `synapse/core/node.py::BaseNode` and `BaseNode._run_wrapper`,
//! translated from Python's dynamic dispatch into a `NodeBehavior` trait
//! object plus a free `run_node` wrapper function.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::bridge::Bridge;
use crate::error::{EngineError, ErrorObject};
use crate::scope::{ContextStack, StackOverrides};
use crate::types::{coerce, DataKind};

/// Flags carried on every `NodeRecord` (spec.md section 3).
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeFlags {
    /// Manages a scope (a Provider-family node).
    pub is_service: bool,
    /// Runs in-thread rather than in a worker/sub-process.
    pub is_native: bool,
    pub is_debug: bool,
    pub allow_dynamic_inputs: bool,
    pub allow_dynamic_outputs: bool,
}

/// A node as loaded from the graph document: identity, schemas, frozen
/// properties. Constructed once per loaded graph; frozen after load
/// (spec.md's Lifecycles paragraph).
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub id: String,
    pub name: String,
    pub node_type: String,
    pub properties: HashMap<String, Value>,
    pub input_schema: HashMap<String, DataKind>,
    pub output_schema: HashMap<String, DataKind>,
    pub flags: NodeFlags,
}

/// Result of a handler invocation. Handlers return a discriminated result —
/// never a raw exception — per spec.md section 9's re-architecture note.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// The handler ran to completion: output values to publish to the
    /// Bridge, the set of output ports just pulsed, and any per-port stack
    /// overrides for the Engine's subsequent fan-out.
    Completed {
        outputs: HashMap<String, Value>,
        active_ports: Vec<String>,
        stack_overrides: StackOverrides,
    },
    /// Park this branch for `ms` milliseconds and resume — the `("_YSWAIT",
    /// ms)` directive from spec.md section 4.4. The handler has already
    /// written `outputs` and knows which `active_ports` it intends to pulse
    /// once the wake timer fires; the Engine defers fan-out until then
    /// (spec.md section 4.10).
    Suspend {
        ms: u64,
        outputs: HashMap<String, Value>,
        active_ports: Vec<String>,
        stack_overrides: StackOverrides,
    },
    /// The handler aborted without error (a false return, per spec.md
    /// section 4.4) — no outputs, no further fan-out this activation.
    Aborted,
}

impl HandlerOutcome {
    pub fn completed(outputs: HashMap<String, Value>, active_ports: Vec<String>) -> Self {
        HandlerOutcome::Completed {
            outputs,
            active_ports,
            stack_overrides: StackOverrides::new(),
        }
    }

    pub fn suspend(ms: u64, outputs: HashMap<String, Value>, active_ports: Vec<String>) -> Self {
        HandlerOutcome::Suspend {
            ms,
            outputs,
            active_ports,
            stack_overrides: StackOverrides::new(),
        }
    }
}

/// Everything a handler needs to run one activation.
pub struct HandlerContext<'a> {
    pub node: &'a NodeRecord,
    pub final_args: HashMap<String, Value>,
    pub context_stack: ContextStack,
    pub bridge: &'a Bridge,
}

impl<'a> HandlerContext<'a> {
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.final_args.get(name)
    }

    pub fn arg_str(&self, name: &str) -> String {
        self.arg(name)
            .map(crate::types::to_string_kind)
            .unwrap_or_default()
    }

    pub fn arg_number(&self, name: &str) -> f64 {
        self.arg(name).map(crate::types::to_number).unwrap_or(0.0)
    }

    pub fn arg_bool(&self, name: &str) -> bool {
        self.arg(name).map(crate::types::to_bool).unwrap_or(false)
    }

    pub fn current_scope(&self) -> &str {
        crate::scope::current_scope(&self.context_stack)
    }
}

/// A registered per-node-type behavior: input/output schemas, flags, and a
/// handler dispatched by trigger port. Generalizes `traits/node_factory.rs`'s
/// `NodeFactory` trait (`build`/`serialize`) to include execution, since
/// this crate's nodes are driven by named per-port handlers rather than
/// bevy systems.
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    fn input_schema(&self) -> HashMap<String, DataKind>;
    fn output_schema(&self) -> HashMap<String, DataKind>;
    fn flags(&self) -> NodeFlags {
        NodeFlags::default()
    }

    /// Runs the handler registered for `trigger_port`. Implementations
    /// return `Err` only for truly exceptional conditions (bugs, I/O
    /// failures); ordinary "nothing to do" cases should return
    /// `HandlerOutcome::Aborted`.
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome>;
}

/// Merges `properties` and `runtime_inputs` into final handler arguments,
/// matching each property key case-insensitively against declared input
/// names (spec.md section 4.3, step 2).
fn merge_args(
    properties: &HashMap<String, Value>,
    runtime_inputs: &HashMap<String, Value>,
    input_schema: &HashMap<String, DataKind>,
) -> HashMap<String, Value> {
    let mut final_args = HashMap::new();

    let canonical = |key: &str| -> String {
        input_schema
            .keys()
            .find(|declared| declared.eq_ignore_ascii_case(key))
            .cloned()
            .unwrap_or_else(|| key.to_string())
    };

    for (key, value) in properties {
        final_args.insert(canonical(key), value.clone());
    }
    for (key, value) in runtime_inputs {
        final_args.insert(canonical(key), value.clone());
    }
    final_args
}

/// Walks the context stack outer-to-inner; for each scope, looks up the
/// owning provider's id (falling back to the raw scope id for scopes no
/// provider registered, e.g. a plain loop scope) and checks
/// `{provider_id}_{input_name}` in the Bridge, then `Global:{input_name}`.
/// First hit wins (spec.md section 4.3, step 3).
fn hijack_missing_inputs(
    final_args: &mut HashMap<String, Value>,
    input_schema: &HashMap<String, DataKind>,
    context_stack: &ContextStack,
    bridge: &Bridge,
) {
    for input_name in input_schema.keys() {
        let is_missing = !final_args.contains_key(input_name)
            || matches!(final_args.get(input_name), Some(Value::Null) | None);
        if !is_missing {
            continue;
        }
        let mut found = false;
        for scope in context_stack {
            let owner = bridge.scope_owner(scope).unwrap_or_else(|| scope.clone());
            let key = format!("{owner}_{input_name}");
            if let Some(value) = bridge.get_raw(&key) {
                final_args.insert(input_name.clone(), value);
                found = true;
                break;
            }
        }
        if !found {
            if let Some(value) = bridge.get_raw(&format!("Global:{input_name}")) {
                final_args.insert(input_name.clone(), value);
            }
        }
    }
}

/// The Node Execution Wrapper (spec.md section 4.3). `hijack` is the
/// provider-installed replacement handler, already resolved by the caller
/// via `Bridge::get_hijack_handler`; when present it runs instead of
/// `behavior`.
#[allow(clippy::too_many_arguments)]
pub async fn run_node(
    node: &NodeRecord,
    behavior: &dyn NodeBehavior,
    hijack: Option<&dyn NodeBehavior>,
    runtime_inputs: HashMap<String, Value>,
    context_stack: ContextStack,
    trigger_port: &str,
    bridge: &Bridge,
    project_name: &str,
) -> Result<HandlerOutcome, EngineError> {
    let input_schema = behavior.input_schema();

    let mut final_args = merge_args(&node.properties, &runtime_inputs, &input_schema);
    hijack_missing_inputs(&mut final_args, &input_schema, &context_stack, bridge);

    for (name, kind) in &input_schema {
        if let Some(value) = final_args.get(name) {
            let coerced = coerce(value, *kind);
            final_args.insert(name.clone(), coerced);
        }
    }

    let ctx = HandlerContext {
        node,
        final_args: final_args.clone(),
        context_stack: context_stack.clone(),
        bridge,
    };

    let active_behavior = hijack.unwrap_or(behavior);
    let result = active_behavior.handle(&ctx, trigger_port).await;

    match result {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            let error_object = ErrorObject::new(
                project_name,
                node.name.clone(),
                final_args,
                err.to_string(),
                "HandlerError",
            );
            bridge.set_raw(
                &format!("{}_LastError", node.id),
                serde_json::to_value(&error_object).unwrap_or(Value::Null),
            );
            bridge.set_raw(
                "_SYSTEM_LAST_ERROR_OBJECT",
                serde_json::to_value(&error_object).unwrap_or(Value::Null),
            );
            bridge.set_raw(
                &format!("{}_ActivePorts", node.id),
                Value::Array(vec![Value::String("Error".to_string())]),
            );
            Err(EngineError::Handler(node.id.clone(), error_object))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_args_is_case_insensitive_on_declared_inputs() {
        let mut schema = HashMap::new();
        schema.insert("Counter".to_string(), DataKind::Number);

        let mut properties = HashMap::new();
        properties.insert("counter".to_string(), json!(1));

        let merged = merge_args(&properties, &HashMap::new(), &schema);
        assert_eq!(merged.get("Counter"), Some(&json!(1)));
    }

    #[test]
    fn hijack_missing_inputs_fills_from_outer_scope() {
        let bridge = Bridge::new();
        bridge.set_raw("Root_Limit", json!(10));

        let mut schema = HashMap::new();
        schema.insert("Limit".to_string(), DataKind::Number);

        let mut args = HashMap::new();
        args.insert("Limit".to_string(), Value::Null);

        let stack = vec!["Root".to_string(), "inner".to_string()];
        hijack_missing_inputs(&mut args, &schema, &stack, &bridge);
        assert_eq!(args.get("Limit"), Some(&json!(10)));
    }
}
