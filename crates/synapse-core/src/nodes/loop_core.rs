//! `While`, `For`, and `ForEach`: the loop family built on a shared
//! Bridge-backed state machine (spec.md section 4.7). Each loop instance
//! pushes one scope for the lifetime of the loop (not one per iteration) so
//! a loop body's locally-scoped writes persist across iterations; `Break`
//! and natural exhaustion both pop that same scope and fire `End`.
//!
//! All three share the same three trigger ports (`Flow` starts the loop,
//! `Continue` re-enters it from the body, `Break` aborts it) and the same
//! two output ports (`Body` pulses one iteration, `End` fires once, after
//! the loop is done) — `remap_legacy_loop_ports` in `migrations.rs` brings
//! older documents' `Loop Flow`/`Loop`/`Exit` port names up to these.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::LoadError;
use crate::graph::{LoaderContext, NodeDocument, NodeFactory};
use crate::node::{HandlerContext, HandlerOutcome, NodeBehavior, NodeFlags};
use crate::scope::{cancel_scope, pop_scope, push_scope, StackOverrides};
use crate::types::DataKind;

fn loop_scope_key(node_id: &str) -> String {
    format!("{node_id}_LoopScope")
}

/// The scope id pushed for this loop instance, if one is currently active
/// (set on `Flow` entry, cleared on exit).
fn active_scope_id(ctx: &HandlerContext<'_>) -> Option<String> {
    ctx.bridge
        .get_raw(&loop_scope_key(&ctx.node.id))
        .and_then(|v| v.as_str().map(str::to_string))
}

/// Pushes a fresh scope for this loop instance and remembers it, or returns
/// the one already pushed for an in-progress loop (`Continue` re-entry).
fn enter_or_resume_scope(ctx: &HandlerContext<'_>, trigger_port: &str) -> crate::scope::ContextStack {
    let key = loop_scope_key(&ctx.node.id);
    if trigger_port == "Flow" {
        let scope_id = format!("{}::{}", ctx.node.id, uuid::Uuid::new_v4());
        ctx.bridge.set_raw(&key, Value::String(scope_id.clone()));
        push_scope(&ctx.context_stack, &scope_id)
    } else {
        ctx.context_stack.clone()
    }
}

/// Pops this loop instance's scope, used when the loop is finished.
fn exit_scope(ctx: &HandlerContext<'_>) -> crate::scope::ContextStack {
    let key = loop_scope_key(&ctx.node.id);
    match ctx.bridge.get_raw(&key).and_then(|v| v.as_str().map(str::to_string)) {
        Some(scope_id) => pop_scope(&ctx.context_stack, &scope_id),
        None => ctx.context_stack.clone(),
    }
}

fn body_outcome(
    ctx: &HandlerContext<'_>,
    trigger_port: &str,
    outputs: HashMap<String, Value>,
) -> HandlerOutcome {
    let stack = enter_or_resume_scope(ctx, trigger_port);
    let mut overrides = StackOverrides::new();
    overrides.set("Body", stack);
    HandlerOutcome::Completed {
        outputs,
        active_ports: vec!["Body".to_string()],
        stack_overrides: overrides,
    }
}

/// Ends the loop: cancels the instance scope (so any in-flight worker still
/// holding it aborts rather than re-entering `Body`), pops it, and fires
/// `End` (spec.md sections 4.5, 4.7, 5 — "Break/End safety").
fn end_outcome(ctx: &HandlerContext<'_>) -> HandlerOutcome {
    if let Some(scope_id) = active_scope_id(ctx) {
        cancel_scope(ctx.bridge, &scope_id);
    }
    let stack = exit_scope(ctx);
    let mut overrides = StackOverrides::new();
    overrides.set("Flow", stack);
    HandlerOutcome::Completed {
        outputs: HashMap::new(),
        active_ports: vec!["Flow".to_string()],
        stack_overrides: overrides,
    }
}

pub struct WhileNode;

/// `{loop}_internal_index`, atomic-incremented in the Bridge (spec.md
/// section 4.7's "State in Bridge per loop node"). Shared by the whole
/// Loop Core family so `While`'s `Index` output is monotonic from 0 just
/// like `For`'s and `ForEach`'s (spec.md section 8's "Loop index
/// monotonicity" testable property applies to all three, not just the two
/// that happen to carry their own range/collection state).
fn internal_index_key(node_id: &str) -> String {
    format!("{node_id}_internal_index")
}

#[async_trait]
impl NodeBehavior for WhileNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Continue".to_string(), DataKind::Flow),
            ("Break".to_string(), DataKind::Flow),
            ("End".to_string(), DataKind::Flow),
            ("Condition".to_string(), DataKind::Boolean),
        ])
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Body".to_string(), DataKind::Flow),
            ("Flow".to_string(), DataKind::Flow),
            ("Index".to_string(), DataKind::Number),
        ])
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags {
            is_native: true,
            ..Default::default()
        }
    }

    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        if trigger_port == "Break" || trigger_port == "End" {
            return Ok(end_outcome(ctx));
        }
        if !ctx.arg_bool("Condition") {
            return Ok(end_outcome(ctx));
        }

        // Tracked as a plain Bridge value, not `Bridge::increment`'s atomic
        // counter map — that map has no reset operation, so a second `Flow`
        // entry into the same node (e.g. a SubGraph re-invoked more than
        // once) would keep counting up from the previous run instead of
        // starting back at 0.
        let key = internal_index_key(&ctx.node.id);
        let index = if trigger_port == "Flow" {
            ctx.bridge.set_raw(&key, json!(0));
            0i64
        } else {
            let previous = ctx
                .bridge
                .get_raw(&key)
                .map(|v| crate::types::to_number(&v) as i64)
                .unwrap_or(0);
            let next = previous + 1;
            ctx.bridge.set_raw(&key, json!(next));
            next
        };

        let outputs = HashMap::from([("Index".to_string(), json!(index))]);
        Ok(body_outcome(ctx, trigger_port, outputs))
    }
}

pub struct WhileFactory;

impl NodeFactory for WhileFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(WhileNode))
    }
}

fn counter_key(node_id: &str) -> String {
    format!("{node_id}_Counter")
}

/// `For`: a numeric range loop, counting from `From` to `To` in steps of
/// `Step` (default `1`), exposed on the `Index` output.
pub struct ForNode;

#[async_trait]
impl NodeBehavior for ForNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Continue".to_string(), DataKind::Flow),
            ("Break".to_string(), DataKind::Flow),
            ("End".to_string(), DataKind::Flow),
            ("From".to_string(), DataKind::Number),
            ("To".to_string(), DataKind::Number),
            ("Step".to_string(), DataKind::Number),
        ])
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Body".to_string(), DataKind::Flow),
            ("Flow".to_string(), DataKind::Flow),
            ("Index".to_string(), DataKind::Number),
        ])
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags {
            is_native: true,
            ..Default::default()
        }
    }

    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        if trigger_port == "Break" || trigger_port == "End" {
            return Ok(end_outcome(ctx));
        }

        let key = counter_key(&ctx.node.id);
        let step = {
            let raw = ctx.arg_number("Step");
            if raw == 0.0 {
                1.0
            } else {
                raw
            }
        };
        let to = ctx.arg_number("To");

        let index = if trigger_port == "Flow" {
            let from = ctx.arg_number("From");
            ctx.bridge.set_raw(&key, json!(from));
            from
        } else {
            let previous = ctx.bridge.get_raw(&key).map(|v| crate::types::to_number(&v)).unwrap_or(0.0);
            let next = previous + step;
            ctx.bridge.set_raw(&key, json!(next));
            next
        };

        let in_range = if step > 0.0 { index < to } else { index > to };
        if !in_range {
            return Ok(end_outcome(ctx));
        }

        let outputs = HashMap::from([("Index".to_string(), json!(index))]);
        Ok(body_outcome(ctx, trigger_port, outputs))
    }
}

pub struct ForFactory;

impl NodeFactory for ForFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(ForNode))
    }
}

/// `ForEach`: iterates a `List`-typed `Items` input, exposing the current
/// element on `Item` and its position on `Index`.
pub struct ForEachNode;

fn items_key(node_id: &str) -> String {
    format!("{node_id}_Items")
}

#[async_trait]
impl NodeBehavior for ForEachNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Continue".to_string(), DataKind::Flow),
            ("Break".to_string(), DataKind::Flow),
            ("End".to_string(), DataKind::Flow),
            ("Items".to_string(), DataKind::List),
        ])
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Body".to_string(), DataKind::Flow),
            ("Flow".to_string(), DataKind::Flow),
            ("Item".to_string(), DataKind::Any),
            ("Index".to_string(), DataKind::Number),
        ])
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags {
            is_native: true,
            ..Default::default()
        }
    }

    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        if trigger_port == "Break" || trigger_port == "End" {
            return Ok(end_outcome(ctx));
        }

        let items_k = items_key(&ctx.node.id);
        let counter_k = counter_key(&ctx.node.id);

        let (items, index) = if trigger_port == "Flow" {
            let items = ctx.arg("Items").cloned().unwrap_or(json!([]));
            ctx.bridge.set_raw(&items_k, items.clone());
            ctx.bridge.set_raw(&counter_k, json!(0));
            (items, 0usize)
        } else {
            let items = ctx.bridge.get_raw(&items_k).unwrap_or(json!([]));
            let previous = ctx
                .bridge
                .get_raw(&counter_k)
                .map(|v| crate::types::to_number(&v) as usize)
                .unwrap_or(0);
            let next = previous + 1;
            ctx.bridge.set_raw(&counter_k, json!(next));
            (items, next)
        };

        let array = items.as_array().cloned().unwrap_or_default();
        let Some(item) = array.get(index) else {
            return Ok(end_outcome(ctx));
        };

        let outputs = HashMap::from([
            ("Item".to_string(), item.clone()),
            ("Index".to_string(), json!(index as f64)),
        ]);
        Ok(body_outcome(ctx, trigger_port, outputs))
    }
}

pub struct ForEachFactory;

impl NodeFactory for ForEachFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(ForEachNode))
    }
}
