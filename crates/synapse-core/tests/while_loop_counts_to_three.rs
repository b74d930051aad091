//! spec.md section 8, scenario 2: "While loop counts to 3". Drives a
//! `While`/`Compare`/`Set Var`/`Add` cycle: each iteration reads the current
//! counter (falling back to its `Add`/`Set Var` properties only on the very
//! first pass, before either node has ever run), increments it, writes it
//! back to `Global:Counter`, and re-evaluates the loop condition against the
//! freshly written value. `Compare`'s `True`/`False` outputs both wire back
//! into `While.Continue` — valid because they are distinct *source* ports
//! feeding the same target port, not two sources for one input.

mod support;

use std::sync::Arc;

use serde_json::json;
use synapse_core::bridge::Bridge;
use synapse_core::engine::{Engine, EngineConfig};

fn document() -> serde_json::Value {
    json!({
        "nodes": [
            { "id": "start", "type": "Start", "name": "Start", "properties": {} },
            { "id": "w", "type": "While", "name": "While", "properties": { "Condition": true } },
            { "id": "add", "type": "Add", "name": "Add", "properties": { "A": 0, "B": 1 } },
            {
                "id": "setvar",
                "type": "Set Var",
                "name": "SetVar",
                "properties": { "Variable Name": "Counter", "Value": 0 }
            },
            {
                "id": "cmp",
                "type": "Compare",
                "name": "Compare",
                "properties": { "B": 3, "Operator": "<" }
            },
            { "id": "ret", "type": "Return", "name": "Return", "properties": { "Inputs": {} } }
        ],
        "wires": [
            { "from_node": "start", "from_port": "Flow", "to_node": "w", "to_port": "Flow" },
            { "from_node": "w", "from_port": "Body", "to_node": "add", "to_port": "Flow" },
            { "from_node": "setvar", "from_port": "Value", "to_node": "add", "to_port": "A" },
            { "from_node": "add", "from_port": "Flow", "to_node": "setvar", "to_port": "Flow" },
            { "from_node": "add", "from_port": "Result", "to_node": "setvar", "to_port": "Value" },
            { "from_node": "setvar", "from_port": "Flow", "to_node": "cmp", "to_port": "Flow" },
            { "from_node": "setvar", "from_port": "Value", "to_node": "cmp", "to_port": "A" },
            { "from_node": "cmp", "from_port": "True", "to_node": "w", "to_port": "Continue" },
            { "from_node": "cmp", "from_port": "False", "to_node": "w", "to_port": "Continue" },
            { "from_node": "cmp", "from_port": "Result", "to_node": "w", "to_port": "Condition" },
            { "from_node": "w", "from_port": "Flow", "to_node": "ret", "to_port": "Flow" }
        ]
    })
}

#[tokio::test]
async fn loops_exactly_three_times_and_stops_at_the_threshold() {
    let graph = Arc::new(support::build(document()));

    let sink = Arc::new(support::VecSink::new());
    let bridge = Bridge::new();
    let config = EngineConfig {
        trace: sink.clone(),
        ..EngineConfig::default()
    };
    let mut engine = Engine::new(graph, bridge.clone(), None, config);
    engine.run().await.expect("engine runs to completion");

    // Return fired at all -- the loop terminated instead of spinning forever.
    assert!(engine.take_return_payload().is_some());
    assert_eq!(bridge.get_raw("Global:Counter"), Some(json!(3.0)));

    // `Body` pulsed exactly 3 times, with a monotonic 0-based Index each
    // time (spec.md section 8's "Loop index monotonicity" testable
    // property, extended to `While` alongside `For`/`ForEach`).
    let body_pulses = sink
        .lines()
        .into_iter()
        .filter(|line| line == "[FLOW] w:Body -> add:Flow")
        .count();
    assert_eq!(body_pulses, 3);

    // The last Body pulse carried Index 2 (0-based: 0, 1, 2).
    assert_eq!(bridge.get_raw("w_internal_index"), Some(json!(2)));
}
