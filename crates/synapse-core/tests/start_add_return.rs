//! spec.md section 8, scenario 1: "Start -> Add -> Return" — the smallest
//! possible graph, run to completion with no pausing, looping, or
//! sub-graphs involved.

mod support;

use std::sync::Arc;

use serde_json::json;
use synapse_core::bridge::Bridge;
use synapse_core::engine::{Engine, EngineConfig};
use synapse_core::graph;

fn document() -> serde_json::Value {
    json!({
        "nodes": [
            {
                "id": "start",
                "type": "Start",
                "name": "Start",
                "properties": { "Outputs": { "A": "Number", "B": "Number" }, "A": 2, "B": 3 }
            },
            { "id": "add", "type": "Add", "name": "Add", "properties": {} },
            {
                "id": "return",
                "type": "Return",
                "name": "Return",
                "properties": { "Inputs": { "Result": "Number" } }
            }
        ],
        "wires": [
            { "from_node": "start", "from_port": "Flow", "to_node": "add", "to_port": "Flow" },
            { "from_node": "start", "from_port": "A", "to_node": "add", "to_port": "A" },
            { "from_node": "start", "from_port": "B", "to_node": "add", "to_port": "B" },
            { "from_node": "add", "from_port": "Flow", "to_node": "return", "to_port": "Flow" },
            { "from_node": "add", "from_port": "Result", "to_node": "return", "to_port": "Result" }
        ]
    })
}

#[tokio::test]
async fn runs_to_completion_and_returns_the_sum() {
    graph::validate_graph(&document()).expect("document passes structural validation");
    let graph = Arc::new(support::build(document()));

    let sink = Arc::new(support::VecSink::new());
    let config = EngineConfig {
        trace: sink.clone(),
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(graph, Bridge::new(), None, config);
    engine.run().await.expect("engine runs to completion");

    let payload = engine.take_return_payload().expect("Return fired");
    assert_eq!(payload.get("Result"), Some(&json!(5.0)));
    assert_eq!(engine.return_label(), Some("Return".to_string()));

    let lines = sink.lines();
    assert!(lines.contains(&"[FLOW] start:Flow -> add:Flow".to_string()));
    assert!(lines.contains(&"[FLOW] add:Flow -> return:Flow".to_string()));
    assert!(lines.contains(&"[FLOW] add:Result -> return:Result".to_string()));
}

/// spec.md section 8's determinism property: the same document run twice,
/// with fresh Bridges, produces the same return payload.
#[tokio::test]
async fn is_deterministic_across_independent_runs() {
    let graph = Arc::new(support::build(document()));

    let mut first = Engine::new(graph.clone(), Bridge::new(), None, EngineConfig::default());
    first.run().await.unwrap();

    let mut second = Engine::new(graph, Bridge::new(), None, EngineConfig::default());
    second.run().await.unwrap();

    assert_eq!(first.take_return_payload(), second.take_return_payload());
}
