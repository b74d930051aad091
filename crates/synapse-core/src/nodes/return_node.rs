//! `Return`: hands a labeled payload back to the enclosing `SubGraph`
//! invocation, or (at the top level) ends the run (spec.md section 4.9). A
//! graph may declare more than one `Return` node — scenario "Sub-graph with
//! two Returns" — each with its own dynamic `Inputs` schema; `SubGraphNode`
//! merges every declared Return's schema into its own output schema and
//! reads back `__RETURN_NODE_LABEL__` to know which one fired.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::LoadError;
use crate::graph::{schema_from_property, LoaderContext, NodeDocument, NodeFactory};
use crate::node::{HandlerContext, HandlerOutcome, NodeBehavior, NodeFlags};
use crate::types::DataKind;

/// Substrings that, when found (case-insensitively) in a Return input's
/// port name, exclude it from the payload handed back to the caller —
/// these are framework bookkeeping ports a document author can still declare
/// on a Return node but that should never leak into `SUBGRAPH_RETURN_*`.
pub fn default_scrub_substrings() -> Vec<String> {
    ["color", "additional", "schema", "context", "provider"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub struct ReturnNode {
    label: String,
    input_schema: HashMap<String, DataKind>,
    scrub_substrings: Vec<String>,
}

impl ReturnNode {
    fn is_scrubbed(&self, port: &str) -> bool {
        let lowered = port.to_lowercase();
        self.scrub_substrings
            .iter()
            .any(|needle| lowered.contains(&needle.to_lowercase()))
    }
}

#[async_trait]
impl NodeBehavior for ReturnNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        let mut schema = self.input_schema.clone();
        schema.insert("Flow".to_string(), DataKind::Flow);
        schema
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::new()
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
        let payload: HashMap<String, Value> = self
            .input_schema
            .keys()
            .filter(|k| !self.is_scrubbed(k))
            .map(|k| (k.clone(), ctx.arg(k).cloned().unwrap_or(Value::Null)))
            .collect();

        let parent_key = ctx.arg_str("__ParentNodeId__");
        ctx.bridge.set_raw(
            &format!("SUBGRAPH_RETURN_{parent_key}"),
            serde_json::to_value(&payload).unwrap_or(Value::Null),
        );
        ctx.bridge
            .set_raw("__RETURN_NODE_LABEL__", Value::String(self.label.clone()));
        ctx.bridge.set_raw("_SYNP_YIELD", Value::Bool(true));

        Ok(HandlerOutcome::completed(HashMap::new(), vec![]))
    }
}

pub struct ReturnFactory;

impl NodeFactory for ReturnFactory {
    fn create(
        &self,
        doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        let input_schema = schema_from_property(&doc.properties, "Inputs");
        let label = doc
            .name
            .clone()
            .unwrap_or_else(|| doc.id.clone());
        let scrub_substrings = doc
            .properties
            .get("Scrub")
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(default_scrub_substrings);
        Ok(Arc::new(ReturnNode {
            label,
            input_schema,
            scrub_substrings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scrub_list_matches_spec() {
        let node = ReturnNode {
            label: "Return".to_string(),
            input_schema: HashMap::new(),
            scrub_substrings: default_scrub_substrings(),
        };
        assert!(node.is_scrubbed("NodeColor"));
        assert!(node.is_scrubbed("AdditionalData"));
        assert!(node.is_scrubbed("OutputSchema"));
        assert!(node.is_scrubbed("ParentContext"));
        assert!(node.is_scrubbed("ProviderId"));
        assert!(!node.is_scrubbed("Status"));
        assert!(!node.is_scrubbed("Value"));
    }
}
