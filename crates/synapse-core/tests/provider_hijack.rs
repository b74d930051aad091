//! spec.md section 8, scenario 4: "Provider hijack". A `Provider` node
//! registers the `Add` node type as one of its capabilities; any `Add`
//! activated inside that provider's scope runs the provider's own
//! `NodeBehavior` instead of `AddNode`'s (spec.md section 4.6's
//! "super-function" precedence) — which never writes a `Result`, proving
//! the hijack actually took effect rather than `AddNode` quietly running
//! anyway. A sibling `Compare` node, reached from the same provider scope
//! but not named in `Capabilities`, is left alone — the override is
//! selective by declared capability name, not a blanket scope-wide swap.

mod support;

use std::sync::Arc;

use serde_json::json;
use synapse_core::bridge::Bridge;
use synapse_core::engine::{Engine, EngineConfig};

fn document() -> serde_json::Value {
    json!({
        "nodes": [
            { "id": "start", "type": "Start", "name": "Start", "properties": {} },
            {
                "id": "provider",
                "type": "Provider",
                "name": "Provider",
                "properties": { "Provider Type": "calc", "Capabilities": ["Add"] }
            },
            {
                "id": "add_inside",
                "type": "Add",
                "name": "AddInside",
                "properties": { "A": 1, "B": 2 }
            },
            {
                "id": "cmp",
                "type": "Compare",
                "name": "Compare",
                "properties": { "A": 5, "B": 3, "Operator": ">" }
            },
            { "id": "provider_end", "type": "Provider End", "name": "ProviderEnd", "properties": {} },
            {
                "id": "ret",
                "type": "Return",
                "name": "Return",
                "properties": { "Inputs": { "ResultInside": "Number", "CompareResult": "Boolean" } }
            }
        ],
        "wires": [
            { "from_node": "start", "from_port": "Flow", "to_node": "provider", "to_port": "Flow" },
            { "from_node": "provider", "from_port": "Flow", "to_node": "add_inside", "to_port": "Flow" },
            { "from_node": "add_inside", "from_port": "Flow", "to_node": "cmp", "to_port": "Flow" },
            { "from_node": "cmp", "from_port": "True", "to_node": "provider_end", "to_port": "Flow" },
            { "from_node": "cmp", "from_port": "False", "to_node": "provider_end", "to_port": "Flow" },
            { "from_node": "provider_end", "from_port": "Flow", "to_node": "ret", "to_port": "Flow" },
            { "from_node": "add_inside", "from_port": "Result", "to_node": "ret", "to_port": "ResultInside" },
            { "from_node": "cmp", "from_port": "Result", "to_node": "ret", "to_port": "CompareResult" }
        ]
    })
}

#[tokio::test]
async fn hijack_is_selective_by_declared_capability_name() {
    let graph = Arc::new(support::build(document()));
    let mut engine = Engine::new(graph, Bridge::new(), None, EngineConfig::default());
    engine.run().await.expect("engine runs to completion");

    let payload = engine.take_return_payload().expect("Return fired");

    // Add was hijacked: the provider's own handler ran instead of AddNode's
    // and never wrote a Result, so the wire into ResultInside never
    // resolved to a value at all, not 1 + 2.
    assert_eq!(payload.get("ResultInside"), Some(&json!(null)));

    // Compare, reached from the very same provider scope, was never named
    // in Capabilities, so it ran its own handler untouched.
    assert_eq!(payload.get("CompareResult"), Some(&json!(true)));
}
