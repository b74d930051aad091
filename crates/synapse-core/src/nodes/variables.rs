//! `Set Var`: writes a named value to the Bridge's `Global` scope (so any
//! `SubGraph` child can read it as an outer-scope hijack fallback — spec.md
//! section 4.1's "Global scope key replication") while also exposing the
//! same value on a normal `Value` output port for direct wiring. These are
//! two distinct mechanisms, not a single generalization of each other: the
//! Bridge write serves cross-scope readers, the output port serves ordinary
//! same-graph wiring.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::LoadError;
use crate::graph::{LoaderContext, NodeDocument, NodeFactory};
use crate::node::{HandlerContext, HandlerOutcome, NodeBehavior, NodeFlags};
use crate::types::DataKind;

pub struct SetVarNode;

#[async_trait]
impl NodeBehavior for SetVarNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Variable Name".to_string(), DataKind::String),
            ("Value".to_string(), DataKind::Any),
        ])
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Value".to_string(), DataKind::Any),
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
        let name = ctx.arg_str("Variable Name");
        let value = ctx.arg("Value").cloned().unwrap_or(serde_json::Value::Null);

        ctx.bridge
            .set_raw(&format!("Global:{name}"), value.clone());

        let outputs = HashMap::from([("Value".to_string(), json!(value))]);
        Ok(HandlerOutcome::completed(outputs, vec!["Flow".to_string()]))
    }
}

pub struct SetVarFactory;

impl NodeFactory for SetVarFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(SetVarNode))
    }
}
