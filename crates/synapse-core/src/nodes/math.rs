//! Leaf computation nodes: `Add` and `Compare` (spec.md section 4.2's
//! worked example and section 8's "Start -> Add -> Return" scenario).
//! Grounded on `components/compute.rs`'s stateless, fixed-schema leaf
//! systems — one struct per node type, no per-instance state, pure
//! functions of their resolved inputs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::LoadError;
use crate::graph::{LoaderContext, NodeDocument, NodeFactory};
use crate::node::{HandlerContext, HandlerOutcome, NodeBehavior, NodeFlags};
use crate::types::DataKind;

pub struct AddNode;

#[async_trait]
impl NodeBehavior for AddNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("A".to_string(), DataKind::Number),
            ("B".to_string(), DataKind::Number),
        ])
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Result".to_string(), DataKind::Number),
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
        _trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        let sum = ctx.arg_number("A") + ctx.arg_number("B");
        let outputs = HashMap::from([("Result".to_string(), json!(sum))]);
        Ok(HandlerOutcome::completed(outputs, vec!["Flow".to_string()]))
    }
}

pub struct AddFactory;

impl NodeFactory for AddFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(AddNode))
    }
}

/// `Compare`: evaluates `A <op> B` where `op` comes from the
/// `CompareOperator`-typed `Operator` input (spec.md section 3's Glossary
/// entry for `CompareOperator`). Fans out its `True`/`False` ports rather
/// than a single `Boolean` output so downstream wiring doesn't need a
/// separate branch node.
pub struct CompareNode;

fn apply_operator(op: &str, a: f64, b: f64) -> bool {
    match op {
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        ">=" => a >= b,
        "==" => (a - b).abs() < f64::EPSILON,
        "!=" => (a - b).abs() >= f64::EPSILON,
        _ => false,
    }
}

#[async_trait]
impl NodeBehavior for CompareNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("A".to_string(), DataKind::Number),
            ("B".to_string(), DataKind::Number),
            ("Operator".to_string(), DataKind::CompareOperator),
        ])
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("True".to_string(), DataKind::Flow),
            ("False".to_string(), DataKind::Flow),
            ("Result".to_string(), DataKind::Boolean),
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
        _trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        let a = ctx.arg_number("A");
        let b = ctx.arg_number("B");
        let op = ctx.arg_str("Operator");
        let result = apply_operator(&op, a, b);
        let outputs = HashMap::from([("Result".to_string(), Value::Bool(result))]);
        let active_port = if result { "True" } else { "False" };
        Ok(HandlerOutcome::completed(outputs, vec![active_port.to_string()]))
    }
}

pub struct CompareFactory;

impl NodeFactory for CompareFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(CompareNode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_table() {
        assert!(apply_operator("<", 1.0, 2.0));
        assert!(apply_operator(">=", 2.0, 2.0));
        assert!(apply_operator("!=", 1.0, 2.0));
        assert!(!apply_operator("==", 1.0, 2.0));
    }
}
