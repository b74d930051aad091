//! spec.md section 8, scenario 3: "Sub-graph with two Returns". The child
//! graph has a `Compare` node routing to one of two distinct, labeled
//! `Return` nodes; the parent wires both of the resulting flow ports
//! (named after each Return, since there's more than one) into its own
//! single top-level `Return`, and reads the routed payload back off the
//! `SubGraph` node's own `Status` output.

mod support;

use std::sync::Arc;

use serde_json::json;
use synapse_core::bridge::Bridge;
use synapse_core::engine::{Engine, EngineConfig};

fn child_document() -> serde_json::Value {
    json!({
        "nodes": [
            {
                "id": "cstart",
                "type": "Start",
                "name": "Start",
                "properties": { "Outputs": { "N": "Number" } }
            },
            {
                "id": "ccmp",
                "type": "Compare",
                "name": "Compare",
                "properties": { "B": 3, "Operator": "<" }
            },
            {
                "id": "csucc",
                "type": "Return",
                "name": "Success",
                "properties": { "Inputs": { "Status": "String" }, "Status": "ok" }
            },
            {
                "id": "cfail",
                "type": "Return",
                "name": "Fail",
                "properties": { "Inputs": { "Status": "String" }, "Status": "fail" }
            }
        ],
        "wires": [
            { "from_node": "cstart", "from_port": "Flow", "to_node": "ccmp", "to_port": "Flow" },
            { "from_node": "cstart", "from_port": "N", "to_node": "ccmp", "to_port": "A" },
            { "from_node": "ccmp", "from_port": "True", "to_node": "csucc", "to_port": "Flow" },
            { "from_node": "ccmp", "from_port": "False", "to_node": "cfail", "to_port": "Flow" }
        ]
    })
}

fn parent_document(n: i64) -> serde_json::Value {
    json!({
        "nodes": [
            {
                "id": "start",
                "type": "Start",
                "name": "Start",
                "properties": { "Outputs": { "N": "Number" }, "N": n }
            },
            {
                "id": "sub",
                "type": "SubGraph",
                "name": "Sub",
                "properties": { "EmbeddedPath": "child" }
            },
            {
                "id": "rs",
                "type": "Return",
                "name": "Return",
                "properties": { "Inputs": { "Status": "String" } }
            }
        ],
        "wires": [
            { "from_node": "start", "from_port": "Flow", "to_node": "sub", "to_port": "Flow" },
            { "from_node": "start", "from_port": "N", "to_node": "sub", "to_port": "N" },
            { "from_node": "sub", "from_port": "Success", "to_node": "rs", "to_port": "Flow" },
            { "from_node": "sub", "from_port": "Fail", "to_node": "rs", "to_port": "Flow" },
            { "from_node": "sub", "from_port": "Status", "to_node": "rs", "to_port": "Status" }
        ],
        "embedded_subgraphs": { "child": child_document() }
    })
}

async fn run_with(n: i64) -> std::collections::HashMap<String, serde_json::Value> {
    let graph = Arc::new(support::build(parent_document(n)));
    let mut engine = Engine::new(graph, Bridge::new(), None, EngineConfig::default());
    engine.run().await.expect("engine runs to completion");
    engine.take_return_payload().expect("top-level Return fired")
}

#[tokio::test]
async fn routes_to_the_success_return_when_condition_holds() {
    let payload = run_with(1).await;
    assert_eq!(payload.get("Status"), Some(&json!("ok")));
}

#[tokio::test]
async fn routes_to_the_fail_return_when_condition_fails() {
    let payload = run_with(5).await;
    assert_eq!(payload.get("Status"), Some(&json!("fail")));
}
