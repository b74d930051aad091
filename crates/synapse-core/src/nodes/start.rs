//! `Start`: the single mandatory entry node (spec.md section 4.8). Its
//! output schema is declared dynamically from the node's own `Outputs`
//! property (`{"A": "Number", ...}`) rather than fixed at compile time,
//! since every graph's Start node exposes whatever project inputs that
//! graph's author chose.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LoadError;
use crate::graph::{schema_from_property, LoaderContext, NodeDocument, NodeFactory};
use crate::node::{HandlerContext, HandlerOutcome, NodeBehavior, NodeFlags};
use crate::types::DataKind;

pub struct StartNode {
    output_schema: HashMap<String, DataKind>,
}

#[async_trait]
impl NodeBehavior for StartNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::new()
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        let mut schema = self.output_schema.clone();
        schema.insert("Flow".to_string(), DataKind::Flow);
        schema
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags {
            is_native: true,
            ..Default::default()
        }
    }

    /// Never actually dispatched through the wire-fan-out path — the
    /// Engine seeds its own active-ports and output values directly at
    /// bootstrap (spec.md section 4.5 step 1) — but implemented for
    /// completeness and so tests can exercise it like any other node.
    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        _trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        let outputs: HashMap<String, Value> = self
            .output_schema
            .keys()
            .filter_map(|k| ctx.arg(k).map(|v| (k.clone(), v.clone())))
            .collect();
        Ok(HandlerOutcome::completed(outputs, vec!["Flow".to_string()]))
    }
}

pub struct StartFactory;

impl NodeFactory for StartFactory {
    fn create(
        &self,
        doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        let output_schema = schema_from_property(&doc.properties, "Outputs");
        Ok(Arc::new(StartNode { output_schema }))
    }
}
