//! Turns a `(node, trigger_port, inputs)` tuple into a scheduled activation
//! (spec.md section 4.4). Grounded on `systems/control.rs::checkpoint_worker`'s
//! `tokio::spawn`-from-in-engine-code pattern for how async side-effecting
//! work is launched, generalized into an explicit native/pooled split.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::bridge::Bridge;
use crate::error::EngineError;
use crate::node::{run_node, HandlerOutcome, NodeBehavior, NodeRecord};
use crate::scope::{scope_cancelled, ContextStack};

/// Bounds the number of concurrently in-flight non-native dispatches,
/// grounded on `resources.rs`'s `AgentConcurrency(Arc<Semaphore>)` resource.
pub struct Dispatcher {
    concurrency: Arc<Semaphore>,
    active_processes: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(max_concurrent_non_native: usize) -> Self {
        Self {
            concurrency: Arc::new(Semaphore::new(max_concurrent_non_native.max(1))),
            active_processes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// UI-facing count of in-flight non-native dispatches.
    pub fn active_process_count(&self) -> usize {
        self.active_processes.load(Ordering::SeqCst)
    }

    /// Dispatches `is_native` nodes on the current task (cheap, shared
    /// memory) and non-native nodes on a pooled `tokio` task. Before
    /// dispatching, checks `SYNAPSE_CANCEL_SCOPE_{scope_id}`; on hit, the
    /// dispatch is a no-op (`HandlerOutcome::Aborted`).
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch(
        &self,
        node: Arc<NodeRecord>,
        behavior: Arc<dyn NodeBehavior>,
        hijack: Option<Arc<dyn NodeBehavior>>,
        runtime_inputs: HashMap<String, Value>,
        context_stack: ContextStack,
        trigger_port: String,
        bridge: Bridge,
        project_name: String,
    ) -> Result<HandlerOutcome, EngineError> {
        let scope_id = crate::scope::current_scope(&context_stack).to_string();
        if scope_cancelled(&bridge, &scope_id) {
            return Ok(HandlerOutcome::Aborted);
        }

        if node.flags.is_native {
            return run_node(
                &node,
                behavior.as_ref(),
                hijack.as_deref(),
                runtime_inputs,
                context_stack,
                &trigger_port,
                &bridge,
                &project_name,
            )
            .await;
        }

        let permit = self
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| EngineError::Bridge(e.to_string()))?;
        self.active_processes.fetch_add(1, Ordering::SeqCst);
        let active_processes = self.active_processes.clone();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            run_node(
                &node,
                behavior.as_ref(),
                hijack.as_deref(),
                runtime_inputs,
                context_stack,
                &trigger_port,
                &bridge,
                &project_name,
            )
            .await
        });

        let result = handle
            .await
            .map_err(|e| EngineError::Bridge(format!("dispatch task panicked: {e}")));
        active_processes.fetch_sub(1, Ordering::SeqCst);
        result?
    }
}
