//! spec.md section 8, scenario 6: "Back-step". `_SYSTEM_STEP_BACK` pops the
//! engine's most recent history frame and restores the Bridge to the
//! snapshot taken right before that node's dispatch (spec.md section 4.5,
//! step 5) — this reverts that node's own writes, it does not replay the
//! graph forward again on its own. Demonstrated here by stepping through
//! Start and Add, then back-stepping once more (past Return's dispatch):
//! Return's effects are undone and the run ends without ever completing,
//! while Add's already-committed write from the earlier step survives,
//! since it predates the reverted snapshot.

mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use synapse_core::bridge::Bridge;
use synapse_core::engine::{Engine, EngineConfig};

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
async fn back_stepping_past_return_reverts_its_effects() {
    let graph = Arc::new(support::build(document()));
    let bridge = Bridge::new();
    bridge.set_raw("_SYSTEM_STEP_MODE", json!(true));

    let mut engine = Engine::new(graph, bridge.clone(), None, EngineConfig::default());
    let handle = tokio::spawn(async move {
        engine.run().await.unwrap();
        engine
    });

    // First step: Start's bootstrap fan-out cascades inline through Add.
    tokio::time::sleep(Duration::from_millis(30)).await;
    bridge.set_raw("_SYSTEM_STEP_TRIGGER", json!(true));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(bridge.get_raw("add_Result"), Some(json!(5.0)));

    // Second step, combined with a back-step request: the step trigger
    // unblocks the wait already parked on Add's pulse, running it forward
    // into Return (which commits its effects and yields); only then, on the
    // next loop iteration, does the engine notice the back-step request and
    // pop that just-taken step, undoing Return's commit.
    bridge.set_raw("_SYSTEM_STEP_TRIGGER", json!(true));
    bridge.set_raw("_SYSTEM_STEP_BACK", json!(true));

    let engine = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("engine settles after the back-step")
        .unwrap();

    assert!(
        engine.take_return_payload().is_none(),
        "Return's commit was reverted by the back-step"
    );
    assert_eq!(
        bridge.get_raw("add_Result"),
        Some(json!(5.0)),
        "Add's earlier, already-recorded write predates the reverted snapshot"
    );
}
