//! The persisted graph document and the resolved, in-memory `Graph` built
//! from it (spec.md sections 3 and 6). Grounded on
//! `graph_loader.rs::load_graph_from_str`'s shape (parse a document, spawn
//! node state, wire it up) but re-targeted from a YAML ECS blueprint onto
//! the JSON schema spec.md section 6 specifies, and from `bevy_ecs::World`
//! spawning onto a plain node arena (spec.md section 9's "arena + index"
//! re-architecture note: nodes are referenced by stable string id, not by
//! graph traversal, so loop/provider cycles are never a structural concern).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LoadError, ValidationError};
use crate::node::{NodeBehavior, NodeFlags, NodeRecord};
use crate::port_registry::{Direction, PortRegistry};
use crate::types::DataKind;
use crate::wire_table::{Wire, WireTable};

/// Current schema version new documents are written at and migrated to
/// (spec.md section 6).
pub const CURRENT_SCHEMA_VERSION: &str = "2.3.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDocument {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireDocument {
    pub from_node: String,
    pub from_port: String,
    pub to_node: String,
    pub to_port: String,
}

/// The top-level persisted document (spec.md section 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub project_category: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub project_vars: HashMap<String, Value>,
    pub nodes: Vec<NodeDocument>,
    pub wires: Vec<WireDocument>,
    #[serde(default)]
    pub embedded_subgraphs: HashMap<String, Value>,
}

fn default_version() -> String {
    CURRENT_SCHEMA_VERSION.to_string()
}

/// Structural validation of a raw document, independent of node-type
/// resolution (spec.md section 3's Invariants / section 8's "every error
/// path in validate_graph is reachable"). Mirrors
/// `synapse/core/schema.py::validate_graph`'s distinct checks one-for-one.
pub fn validate_graph(raw: &Value) -> Result<(), ValidationError> {
    let Value::Object(root) = raw else {
        return Err(ValidationError::RootNotObject);
    };

    let nodes = match root.get("nodes") {
        Some(Value::Array(nodes)) => nodes,
        _ => return Err(ValidationError::NodesNotArray),
    };
    let wires = match root.get("wires") {
        Some(Value::Array(wires)) => wires,
        _ => return Err(ValidationError::WiresNotArray),
    };

    for (idx, node) in nodes.iter().enumerate() {
        if node.get("id").and_then(Value::as_str).is_none() {
            return Err(ValidationError::NodeMissingId(idx));
        }
        if node.get("type").and_then(Value::as_str).is_none() {
            return Err(ValidationError::NodeMissingType(idx));
        }
    }

    for (idx, wire) in wires.iter().enumerate() {
        if wire.get("from_node").and_then(Value::as_str).is_none() {
            return Err(ValidationError::WireMissingFromNode(idx));
        }
        if wire.get("to_node").and_then(Value::as_str).is_none() {
            return Err(ValidationError::WireMissingToNode(idx));
        }
    }

    let start_count = nodes
        .iter()
        .filter(|n| n.get("type").and_then(Value::as_str) == Some("Start"))
        .count();
    if start_count != 1 {
        return Err(ValidationError::StartNodeCount(start_count));
    }

    let return_count = nodes
        .iter()
        .filter(|n| n.get("type").and_then(Value::as_str) == Some("Return"))
        .count();
    if return_count == 0 {
        return Err(ValidationError::NoReturnNodes);
    }

    Ok(())
}

/// A resolved, load-time-frozen graph: node records, their behaviors, the
/// wire index, and the port registry (spec.md sections 3 and 9).
pub struct Graph {
    pub nodes: HashMap<String, Arc<NodeRecord>>,
    pub behaviors: HashMap<String, Arc<dyn NodeBehavior>>,
    pub wires: WireTable,
    pub port_registry: PortRegistry,
    pub start_node_id: String,
    pub project_vars: HashMap<String, Value>,
    pub project_name: String,
}

impl Graph {
    pub fn node(&self, node_id: &str) -> Option<&Arc<NodeRecord>> {
        self.nodes.get(node_id)
    }

    pub fn behavior(&self, node_id: &str) -> Option<&Arc<dyn NodeBehavior>> {
        self.behaviors.get(node_id)
    }
}

/// Produces a node's concrete runtime behavior given its declaration in the
/// document, and (for SubGraph) may recurse into `load_document` via
/// `LoaderContext`.
pub trait NodeFactory: Send + Sync {
    fn create(
        &self,
        doc: &NodeDocument,
        ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError>;
}

#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Arc<dyn NodeFactory>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_type: impl Into<String>, factory: Arc<dyn NodeFactory>) {
        self.factories.insert(node_type.into(), factory);
    }

    pub fn get(&self, node_type: &str) -> Option<&Arc<dyn NodeFactory>> {
        self.factories.get(node_type)
    }
}

/// State threaded through a single (possibly recursive) graph load.
pub struct LoaderContext<'a> {
    pub registry: &'a NodeRegistry,
    pub embedded_subgraphs: &'a HashMap<String, Value>,
    pub base_dir: Option<PathBuf>,
}

/// Loads and freezes a `Graph` from an already-migrated `GraphDocument`
/// (spec.md section 3's Invariants: wire endpoints must reference existing
/// nodes and declared ports, or load fails).
pub fn load_graph(document: &GraphDocument, registry: &NodeRegistry) -> Result<Graph, LoadError> {
    let mut ctx = LoaderContext {
        registry,
        embedded_subgraphs: &document.embedded_subgraphs,
        base_dir: None,
    };
    build_graph(document, &mut ctx)
}

/// Like `load_graph`, but resolves `embedded_subgraphs`/file-path references
/// relative to `base_dir` (used when loading a SubGraph node's child
/// document from a file).
pub fn build_graph(document: &GraphDocument, ctx: &mut LoaderContext) -> Result<Graph, LoadError> {
    let mut nodes = HashMap::new();
    let mut behaviors: HashMap<String, Arc<dyn NodeBehavior>> = HashMap::new();
    let mut port_registry = PortRegistry::new();
    let mut start_node_id = None;

    for node_doc in &document.nodes {
        let factory = ctx
            .registry
            .get(&node_doc.node_type)
            .ok_or_else(|| LoadError::UnknownNodeType(node_doc.node_type.clone()))?;
        let behavior = factory.create(node_doc, ctx)?;

        let flags = behavior.flags();
        let record = NodeRecord {
            id: node_doc.id.clone(),
            name: node_doc.name.clone().unwrap_or_else(|| node_doc.id.clone()),
            node_type: node_doc.node_type.clone(),
            properties: node_doc.properties.clone(),
            input_schema: behavior.input_schema(),
            output_schema: behavior.output_schema(),
            flags,
        };

        for port in record.input_schema.keys() {
            port_registry.assign(&record.id, port, Direction::Input);
        }
        for port in record.output_schema.keys() {
            port_registry.assign(&record.id, port, Direction::Output);
        }

        if node_doc.node_type == "Start" {
            start_node_id = Some(record.id.clone());
        }

        nodes.insert(record.id.clone(), Arc::new(record));
        behaviors.insert(node_doc.id.clone(), behavior);
    }

    let start_node_id = start_node_id.ok_or_else(|| {
        LoadError::Validation(ValidationError::StartNodeCount(0))
    })?;

    // Dynamic-port node types (Start/Return/SubGraph) accept any port name
    // the document wires to them; everything else, including Provider End
    // (fixed Flow-in/Flow-out), must reference a port the node actually
    // declared.
    let dynamic_port_types = ["Start", "Return", "SubGraph"];

    let mut wires = Vec::with_capacity(document.wires.len());
    for wire in &document.wires {
        let from = nodes
            .get(&wire.from_node)
            .ok_or_else(|| LoadError::UnknownWireNode(wire.from_node.clone()))?;
        let to = nodes
            .get(&wire.to_node)
            .ok_or_else(|| LoadError::UnknownWireNode(wire.to_node.clone()))?;

        if !dynamic_port_types.contains(&from.node_type.as_str())
            && !from.output_schema.contains_key(&wire.from_port)
        {
            return Err(LoadError::UnknownWirePort {
                node_id: wire.from_node.clone(),
                port: wire.from_port.clone(),
            });
        }
        if !dynamic_port_types.contains(&to.node_type.as_str())
            && !to.input_schema.contains_key(&wire.to_port)
        {
            return Err(LoadError::UnknownWirePort {
                node_id: wire.to_node.clone(),
                port: wire.to_port.clone(),
            });
        }

        wires.push(Wire {
            from_node: wire.from_node.clone(),
            from_port: wire.from_port.clone(),
            to_node: wire.to_node.clone(),
            to_port: wire.to_port.clone(),
        });
    }

    Ok(Graph {
        nodes,
        behaviors,
        wires: WireTable::build(wires),
        port_registry,
        start_node_id,
        project_vars: document.project_vars.clone(),
        project_name: document.project_name.clone(),
    })
}

/// Parses a dynamic port-schema declaration (`{"A": "Number"}`) off a node's
/// properties under `key`, used by Start/Return to build their per-graph
/// output/input schema (spec.md section 4.8's dynamic-schema note extends
/// the same idea to SubGraph, derived instead from the child graph).
pub fn schema_from_property(
    properties: &HashMap<String, Value>,
    key: &str,
) -> HashMap<String, DataKind> {
    let mut schema = HashMap::new();
    if let Some(Value::Object(map)) = properties.get(key) {
        for (port, kind) in map {
            if let Some(kind_name) = kind.as_str() {
                if let Some(kind) = DataKind::from_name(kind_name) {
                    schema.insert(port.clone(), kind);
                }
            }
        }
    }
    schema
}

pub fn resolve_subgraph_document(
    node_doc: &NodeDocument,
    ctx: &LoaderContext,
) -> Result<GraphDocument, LoadError> {
    let file_path = node_doc
        .properties
        .get("Path")
        .or_else(|| node_doc.properties.get("path"))
        .and_then(Value::as_str);

    // Resolution order: file path first, embedded document as fallback —
    // see DESIGN.md's Open Question resolution for why this direction was
    // picked over the reverse.
    if let Some(path) = file_path {
        let resolved = match &ctx.base_dir {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        };
        if let Ok(contents) = std::fs::read_to_string(&resolved) {
            let raw: Value = serde_json::from_str(&contents)
                .map_err(|e| LoadError::MalformedJson(e.to_string()))?;
            validate_graph(&raw).map_err(LoadError::Validation)?;
            let doc: GraphDocument = serde_json::from_value(raw)
                .map_err(|e| LoadError::MalformedJson(e.to_string()))?;
            return Ok(doc);
        }
    }

    let embed_key = node_doc
        .properties
        .get("EmbeddedPath")
        .and_then(Value::as_str)
        .unwrap_or(node_doc.id.as_str());

    let raw = ctx
        .embedded_subgraphs
        .get(embed_key)
        .ok_or_else(|| LoadError::MalformedJson(format!(
            "SubGraph node '{}' has no resolvable file path or embedded document",
            node_doc.id
        )))?;
    validate_graph(raw).map_err(LoadError::Validation)?;
    serde_json::from_value(raw.clone()).map_err(|e| LoadError::MalformedJson(e.to_string()))
}

pub fn subgraph_base_dir(node_doc: &NodeDocument) -> Option<PathBuf> {
    node_doc
        .properties
        .get("Path")
        .or_else(|| node_doc.properties.get("path"))
        .and_then(Value::as_str)
        .and_then(|p| Path::new(p).parent())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_must_be_object() {
        assert_eq!(
            validate_graph(&json!([1, 2])),
            Err(ValidationError::RootNotObject)
        );
    }

    #[test]
    fn nodes_must_be_array() {
        assert_eq!(
            validate_graph(&json!({"nodes": {}, "wires": []})),
            Err(ValidationError::NodesNotArray)
        );
    }

    #[test]
    fn wires_must_be_array() {
        assert_eq!(
            validate_graph(&json!({"nodes": [], "wires": {}})),
            Err(ValidationError::WiresNotArray)
        );
    }

    #[test]
    fn node_missing_id_or_type() {
        assert_eq!(
            validate_graph(&json!({"nodes": [{"type": "Start"}], "wires": []})),
            Err(ValidationError::NodeMissingId(0))
        );
        assert_eq!(
            validate_graph(&json!({"nodes": [{"id": "n1"}], "wires": []})),
            Err(ValidationError::NodeMissingType(0))
        );
    }

    #[test]
    fn wire_missing_endpoints() {
        let nodes = json!([{"id": "s", "type": "Start"}, {"id": "r", "type": "Return"}]);
        assert_eq!(
            validate_graph(&json!({"nodes": nodes, "wires": [{"to_node": "r"}]})),
            Err(ValidationError::WireMissingFromNode(0))
        );
        assert_eq!(
            validate_graph(&json!({"nodes": nodes, "wires": [{"from_node": "s"}]})),
            Err(ValidationError::WireMissingToNode(0))
        );
    }

    #[test]
    fn exactly_one_start_and_at_least_one_return() {
        let no_start = json!({"nodes": [{"id": "r", "type": "Return"}], "wires": []});
        assert_eq!(
            validate_graph(&no_start),
            Err(ValidationError::StartNodeCount(0))
        );

        let two_starts = json!({
            "nodes": [
                {"id": "s1", "type": "Start"},
                {"id": "s2", "type": "Start"},
                {"id": "r", "type": "Return"}
            ],
            "wires": []
        });
        assert_eq!(
            validate_graph(&two_starts),
            Err(ValidationError::StartNodeCount(2))
        );

        let no_return = json!({"nodes": [{"id": "s", "type": "Start"}], "wires": []});
        assert_eq!(validate_graph(&no_return), Err(ValidationError::NoReturnNodes));
    }

    #[test]
    fn minimal_valid_document_passes() {
        let doc = json!({
            "nodes": [
                {"id": "s", "type": "Start"},
                {"id": "r", "type": "Return"}
            ],
            "wires": [{"from_node": "s", "from_port": "Flow", "to_node": "r", "to_port": "Flow"}]
        });
        assert!(validate_graph(&doc).is_ok());
    }
}
