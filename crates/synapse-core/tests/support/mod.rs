//! Shared scaffolding for the integration tests under this directory: a
//! `Vec`-backed `TraceSink` and a `serde_json::Value -> Graph` helper so each
//! scenario file can write its graph as a plain JSON literal, the same shape
//! a document on disk would have.

use std::sync::Mutex;

use synapse_core::graph::{Graph, GraphDocument};
use synapse_core::nodes::default_registry;
use synapse_core::trace::TraceSink;

/// Collects emitted trace lines in order, for assertions on the `[FLOW]` /
/// `[NODE_START]` / etc. stream (spec.md section 6).
#[derive(Default)]
pub struct VecSink(Mutex<Vec<String>>);

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl TraceSink for VecSink {
    fn emit(&self, line: String) {
        self.0.lock().unwrap().push(line);
    }
}

/// Parses a document literal and builds it against the built-in node
/// registry, panicking with the loader's own error on a malformed fixture —
/// these are hand-authored test graphs, not user input.
pub fn build(document: serde_json::Value) -> Graph {
    let document: GraphDocument =
        serde_json::from_value(document).expect("test fixture is a well-formed GraphDocument");
    synapse_core::graph::load_graph(&document, &default_registry())
        .expect("test fixture builds into a Graph")
}
