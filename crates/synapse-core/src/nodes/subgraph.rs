//! `SubGraph`: runs a nested graph document to completion in its own child
//! `Engine`/`Bridge` pair (spec.md sections 4.8, 4.9). The child graph is
//! resolved once, at load time (file-path-first, embedded-document
//! fallback — see `DESIGN.md`'s Open Question resolution); each `Flow`
//! activation spins up a *fresh* child `Bridge` so concurrent or repeated
//! sub-graph runs never share state, unless `Isolated` is `false`, in which
//! case the child inherits the parent's `Global:`-prefixed keys (spec.md
//! section 4.1's "Global scope key replication").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::bridge::Bridge;
use crate::engine::{Engine, EngineConfig};
use crate::error::LoadError;
use crate::graph::{
    build_graph, resolve_subgraph_document, subgraph_base_dir, Graph, LoaderContext, NodeDocument,
    NodeFactory,
};
use crate::node::{HandlerContext, HandlerOutcome, NodeBehavior, NodeFlags};
use crate::types::DataKind;

pub struct SubGraphNode {
    child_graph: Arc<Graph>,
    input_schema: HashMap<String, DataKind>,
    output_schema: HashMap<String, DataKind>,
    /// Flow-typed output ports this node can activate: one per distinct
    /// Return node in the child graph, or the single generic `"Flow"` when
    /// the child graph has exactly one Return (spec.md section 4.8).
    flow_ports: Vec<String>,
    isolated: bool,
}

impl SubGraphNode {
    /// The port to activate for a given child-graph return label, per
    /// spec.md section 4.8: a lone generic Return maps to this node's own
    /// `"Flow"`; with multiple Returns, each keeps its own label as the
    /// flow port name.
    fn flow_port_for(&self, label: Option<&str>) -> String {
        if self.flow_ports.len() <= 1 {
            return "Flow".to_string();
        }
        match label {
            Some(label) if self.flow_ports.iter().any(|p| p == label) => label.to_string(),
            _ => "Flow".to_string(),
        }
    }
}

#[async_trait]
impl NodeBehavior for SubGraphNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        let mut schema = self.input_schema.clone();
        schema.insert("Flow".to_string(), DataKind::Flow);
        schema
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        let mut schema = self.output_schema.clone();
        for port in &self.flow_ports {
            schema.insert(port.clone(), DataKind::Flow);
        }
        schema
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags {
            is_native: false,
            ..Default::default()
        }
    }

    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        _trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        let child_bridge = Bridge::new();

        // Global-scope key replication (spec.md section 4.1) is
        // unconditional — it is the context *stack* inheritance below that
        // `Isolated` gates, not this.
        for (key, value) in ctx.bridge.dump_state() {
            if key.starts_with("Global:") {
                child_bridge.set_raw(&key, value);
            }
        }

        let mut child_engine = Engine::new(
            self.child_graph.clone(),
            child_bridge,
            Some(ctx.node.id.clone()),
            EngineConfig::default(),
        );

        for port in self.input_schema.keys() {
            if let Some(value) = ctx.arg(port) {
                child_engine.seed_input(port.clone(), value.clone());
            }
        }
        if !self.isolated {
            child_engine.seed_stack(ctx.context_stack.clone());
        }

        // `handle` is itself invoked from within `Engine::activate`, so
        // running a nested `Engine::run` requires boxing the recursive
        // async call.
        Box::pin(child_engine.run()).await?;

        let outputs = child_engine.take_return_payload().unwrap_or_default();
        let label = child_engine.return_label();
        ctx.bridge.set_raw(
            &format!("{}_ReturnLabel", ctx.node.id),
            label.clone().map(Value::String).unwrap_or(Value::Null),
        );

        let active_port = self.flow_port_for(label.as_deref());
        Ok(HandlerOutcome::completed(outputs, vec![active_port]))
    }
}

pub struct SubGraphFactory;

impl NodeFactory for SubGraphFactory {
    fn create(
        &self,
        doc: &NodeDocument,
        ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        let document = resolve_subgraph_document(doc, ctx)?;

        let mut child_ctx = LoaderContext {
            registry: ctx.registry,
            embedded_subgraphs: &document.embedded_subgraphs,
            base_dir: subgraph_base_dir(doc),
        };
        let child_graph = build_graph(&document, &mut child_ctx)?;

        let input_schema = child_graph
            .node(&child_graph.start_node_id)
            .map(|start| {
                let mut schema = start.output_schema.clone();
                schema.remove("Flow");
                schema
            })
            .unwrap_or_default();

        let return_nodes: Vec<_> = child_graph
            .nodes
            .values()
            .filter(|node| node.node_type == "Return")
            .collect();

        let mut output_schema = HashMap::new();
        for node in &return_nodes {
            for (port, kind) in &node.input_schema {
                if port != "Flow" {
                    output_schema.insert(port.clone(), *kind);
                }
            }
        }

        let flow_ports = if return_nodes.len() <= 1 {
            vec!["Flow".to_string()]
        } else {
            return_nodes.iter().map(|node| node.name.clone()).collect()
        };

        let isolated = doc
            .properties
            .get("Isolated")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Arc::new(SubGraphNode {
            child_graph: Arc::new(child_graph),
            input_schema,
            output_schema,
            flow_ports,
            isolated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(flow_ports: Vec<&str>) -> SubGraphNode {
        SubGraphNode {
            child_graph: Arc::new(Graph {
                nodes: HashMap::new(),
                behaviors: HashMap::new(),
                wires: Default::default(),
                port_registry: Default::default(),
                start_node_id: String::new(),
                project_vars: HashMap::new(),
                project_name: String::new(),
            }),
            input_schema: HashMap::new(),
            output_schema: HashMap::new(),
            flow_ports: flow_ports.into_iter().map(str::to_string).collect(),
            isolated: true,
        }
    }

    #[test]
    fn lone_return_maps_to_flow_regardless_of_label() {
        let n = node(vec!["Flow"]);
        assert_eq!(n.flow_port_for(Some("Return")), "Flow");
        assert_eq!(n.flow_port_for(None), "Flow");
    }

    #[test]
    fn multiple_returns_route_by_label() {
        let n = node(vec!["Success", "Fail"]);
        assert_eq!(n.flow_port_for(Some("Success")), "Success");
        assert_eq!(n.flow_port_for(Some("Fail")), "Fail");
    }

    #[test]
    fn multiple_returns_unknown_label_falls_back_to_flow() {
        let n = node(vec!["Success", "Fail"]);
        assert_eq!(n.flow_port_for(Some("Unknown")), "Flow");
        assert_eq!(n.flow_port_for(None), "Flow");
    }
}
