//! Structured error kinds. Internal plumbing still returns `anyhow::Result`
//! the way the rest of this codebase does, but the crate boundary
//! distinguishes Load/Validation/Engine failures so callers can match on
//! kind rather than parse a message (spec.md section 7).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Raised synchronously from graph loading; the Engine never starts.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("malformed graph document: {0}")]
    MalformedJson(String),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("wire references unknown node '{0}'")]
    UnknownWireNode(String),
    #[error("wire references undeclared port '{node_id}.{port}'")]
    UnknownWirePort { node_id: String, port: String },
    #[error("unknown node type '{0}' and no sub-graph fallback")]
    UnknownNodeType(String),
}

/// Structural validation of a raw graph document, independent of node-type
/// resolution. Mirrors `synapse/core/schema.py::validate_graph`'s distinct
/// checks one-for-one so each is independently reachable and testable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("graph document root must be a JSON object")]
    RootNotObject,
    #[error("'nodes' must be an array")]
    NodesNotArray,
    #[error("'wires' must be an array")]
    WiresNotArray,
    #[error("node at index {0} is missing 'id'")]
    NodeMissingId(usize),
    #[error("node at index {0} is missing 'type'")]
    NodeMissingType(usize),
    #[error("wire at index {0} is missing 'from_node'")]
    WireMissingFromNode(usize),
    #[error("wire at index {0} is missing 'to_node'")]
    WireMissingToNode(usize),
    #[error("graph must have exactly one Start node, found {0}")]
    StartNodeCount(usize),
    #[error("graph must have at least one Return node, found 0")]
    NoReturnNodes,
}

/// `{project_name, node_name, captured_inputs, error_message, error_type, stack}`
/// per spec.md section 3. Created on any handler exception.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    pub project_name: String,
    pub node_name: String,
    pub captured_inputs: HashMap<String, serde_json::Value>,
    pub error_message: String,
    pub error_type: String,
    pub stack: Option<String>,
}

impl ErrorObject {
    pub fn new(
        project_name: impl Into<String>,
        node_name: impl Into<String>,
        captured_inputs: HashMap<String, serde_json::Value>,
        error_message: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            node_name: node_name.into(),
            captured_inputs,
            error_message: error_message.into(),
            error_type: error_type.into(),
            stack: None,
        }
    }
}

/// Errors surfaced while the Engine is running.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("handler error on node '{0}': {1:?}")]
    Handler(String, ErrorObject),
    #[error("bridge failure: {0}")]
    Bridge(String),
    #[error("required provider '{provider_type}' not found for node '{node_id}'")]
    MissingProvider {
        node_id: String,
        provider_type: String,
    },
    #[error("unknown node '{0}' referenced at runtime")]
    UnknownNode(String),
}
