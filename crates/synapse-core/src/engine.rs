//! The pulse loop (spec.md section 4.5). Grounded on `app.rs::App::run`'s
//! manual loop (`update()`, yield to the async runtime, sleep when idle) —
//! but replacing its always-on `Schedule` tick with the active-ports-draining
//! sweep spec.md describes: each iteration drains every node's non-empty
//! `_ActivePorts` list, resolves wires, and dispatches the targets, rather
//! than running every system over every entity on every tick.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::bridge::Bridge;
use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::graph::Graph;
use crate::node::HandlerOutcome;
use crate::port_registry::Direction;
use crate::scope::{self, ContextStack};
use crate::trace::{NullSink, TraceEvent, TraceSink};

/// A caller-provided source of interactive control: pause/speed/stop files
/// on disk, a UI command channel, or (in tests) nothing at all. Polled once
/// per engine iteration, ahead of the pause gate (spec.md section 5, point
/// (c)). Keeping file/UI I/O behind this trait keeps it "opaque to the
/// engine," per spec.md section 5.
pub trait ControlSource: Send + Sync {
    fn poll(&self, bridge: &Bridge);
}

pub struct NullControlSource;

impl ControlSource for NullControlSource {
    fn poll(&self, _bridge: &Bridge) {}
}

const SYS_PAUSE: &str = "_SYSTEM_PAUSE";
const SYS_STEP_MODE: &str = "_SYSTEM_STEP_MODE";
const SYS_STEP_TRIGGER: &str = "_SYSTEM_STEP_TRIGGER";
const SYS_STEP_BACK: &str = "_SYSTEM_STEP_BACK";
const SYS_SHUTDOWN: &str = "_SYSTEM_SHUTDOWN";
const SYS_NEXT_NODE: &str = "_SYSTEM_NEXT_NODE";
const SYS_NODE_DELAY_MS: &str = "_SYSTEM_NODE_DELAY_MS";

fn active_ports_key(node_id: &str) -> String {
    format!("{node_id}_ActivePorts")
}

struct TimerEntry {
    wake_at: Instant,
    node_id: String,
    /// The scope that was active when this node's activation suspended —
    /// not the node's own id — so a `Loop.End`/`Break` cancelling that scope
    /// drops the parked timer instead of letting it fire into a torn-down
    /// iteration (spec.md's "Break/End safety" testable property).
    scope: String,
    ms: u64,
    outputs: HashMap<String, Value>,
    active_ports: Vec<String>,
}

struct HistoryFrame {
    node_id: String,
    snapshot: HashMap<String, Value>,
}

pub struct EngineConfig {
    pub max_concurrent_non_native: usize,
    pub history_capacity: usize,
    pub trace: Arc<dyn TraceSink>,
    pub control: Arc<dyn ControlSource>,
    pub back_step_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_non_native: 16,
            history_capacity: 64,
            trace: Arc::new(NullSink),
            control: Arc::new(NullControlSource),
            back_step_enabled: true,
        }
    }
}

/// One run of the pulse loop over a single `Graph`. A fresh `Engine` (fresh
/// `Bridge`) is created per graph run (spec.md section 9): the top-level CLI
/// run, and each `SubGraph` child invocation.
pub struct Engine {
    graph: Arc<Graph>,
    bridge: Bridge,
    dispatcher: Dispatcher,
    trace: Arc<dyn TraceSink>,
    control: Arc<dyn ControlSource>,
    history: VecDeque<HistoryFrame>,
    history_capacity: usize,
    back_step_enabled: bool,
    /// `None` for a top-level run; `Some(subgraph_node_id)` for a child
    /// engine invoked from a `SubGraph` node, used to key
    /// `SUBGRAPH_RETURN_{parent_node_id}` (spec.md sections 4.8, 4.9).
    parent_node_id: Option<String>,
    current_node_id: String,
    timers: Vec<TimerEntry>,
    /// The context stack a node's next activation should inherit, set by
    /// whichever pulse most recently targeted it (root for anything reached
    /// only from Start). Updated by `fan_out` from the source activation's
    /// `stack_overrides`, so loop/provider scope pushes propagate to the
    /// ports they actually target rather than every fan-out target.
    node_stacks: HashMap<String, ContextStack>,
    /// The most recent `stack_overrides` a node's own activation produced,
    /// consulted by `fan_out` when that node later pulses its outputs.
    node_stack_overrides: HashMap<String, crate::scope::StackOverrides>,
    /// Values a `SubGraph` parent injected for this run's `Start` node,
    /// keyed by output-port name — takes precedence over the node's own
    /// loaded `properties` (spec.md section 4.8, step 4). Empty for a
    /// top-level run, where Start's outputs come from its properties alone.
    initial_inputs: HashMap<String, Value>,
    /// The context stack a non-`Isolated` `SubGraph` child inherits from
    /// its parent at invocation time (spec.md section 4.8, step 3). `None`
    /// means start from the root stack, as a top-level run or an `Isolated`
    /// child does.
    initial_stack: Option<ContextStack>,
}

impl Engine {
    pub fn new(
        graph: Arc<Graph>,
        bridge: Bridge,
        parent_node_id: Option<String>,
        config: EngineConfig,
    ) -> Self {
        let start_node_id = graph.start_node_id.clone();
        Self {
            graph,
            bridge,
            dispatcher: Dispatcher::new(config.max_concurrent_non_native.max(1)),
            trace: config.trace,
            control: config.control,
            history: VecDeque::new(),
            history_capacity: config.history_capacity.max(1),
            back_step_enabled: config.back_step_enabled,
            parent_node_id,
            current_node_id: start_node_id,
            timers: Vec::new(),
            node_stacks: HashMap::new(),
            node_stack_overrides: HashMap::new(),
            initial_inputs: HashMap::new(),
            initial_stack: None,
        }
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Seeds a value for one of the Start node's output ports, overriding
    /// whatever that port's loaded `properties` declare. Used by `SubGraph`
    /// to inject its caller's keyword arguments into the child run before
    /// `run()` bootstraps (spec.md section 4.8, step 4).
    pub fn seed_input(&mut self, port: impl Into<String>, value: Value) {
        self.initial_inputs.insert(port.into(), value);
    }

    /// Seeds the context stack the child's `Start` node (and everything
    /// reached from it) inherits, instead of a fresh root stack. Used by a
    /// non-`Isolated` `SubGraph` to hand its own stack down to the child
    /// (spec.md section 4.8, step 3).
    pub fn seed_stack(&mut self, stack: ContextStack) {
        self.initial_stack = Some(stack);
    }

    fn parent_key(&self) -> String {
        self.parent_node_id.clone().unwrap_or_else(|| "__ROOT__".to_string())
    }

    /// Injects `project_vars` at the root scope and bootstraps the Start
    /// node by writing `["Flow"]` to its active-ports (spec.md section 4.5,
    /// step 1).
    fn bootstrap(&mut self) {
        for (key, value) in self.graph.project_vars.clone() {
            self.bridge.set(&key, value, crate::bridge::ROOT_SCOPE, "project_vars");
        }

        if let Some(start) = self.graph.node(&self.graph.start_node_id) {
            for port in start.output_schema.keys() {
                let raw = self
                    .initial_inputs
                    .get(port)
                    .or_else(|| start.properties.get(port));
                if let (Some(value), Some(kind)) = (raw, start.output_schema.get(port)) {
                    let coerced = crate::types::coerce(value, *kind);
                    self.write_port(&start.id, port, coerced);
                }
            }
        }

        let start_stack = self.initial_stack.clone().unwrap_or_else(scope::root_stack);
        self.node_stacks
            .insert(self.graph.start_node_id.clone(), start_stack);
        self.bridge.set_raw(
            &active_ports_key(&self.graph.start_node_id),
            Value::Array(vec![Value::String("Flow".to_string())]),
        );
    }

    fn write_port(&self, node_id: &str, port: &str, value: Value) {
        let uuid_key = self.graph.port_registry.bridge_key(node_id, port, Direction::Output);
        self.bridge.set_raw(&uuid_key, value.clone());
        self.bridge
            .set_raw(&crate::port_registry::legacy_bridge_key(node_id, port), value);
    }

    fn read_output(&self, node_id: &str, port: &str) -> Option<Value> {
        let uuid_key = self.graph.port_registry.bridge_key(node_id, port, Direction::Output);
        self.bridge
            .get_raw(&uuid_key)
            .or_else(|| self.bridge.get_raw(&crate::port_registry::legacy_bridge_key(node_id, port)))
    }

    /// Composes a target node's data-input arguments by resolving each
    /// declared input port's wired source, per spec.md section 4.5.
    fn resolve_inputs(&self, target_node_id: &str) -> HashMap<String, Value> {
        let mut inputs = HashMap::new();
        let Some(target) = self.graph.node(target_node_id) else {
            return inputs;
        };
        for port in target.input_schema.keys() {
            if let Some(source) = self.graph.wires.sources(target_node_id, port).first() {
                if let Some(value) = self.read_output(&source.from_node, &source.from_port) {
                    inputs.insert(port.clone(), value);
                }
            }
        }
        inputs
    }

    fn should_shutdown(&self) -> bool {
        self.bridge
            .get_raw(SYS_SHUTDOWN)
            .map(|v| crate::types::to_bool(&v))
            .unwrap_or(false)
    }

    async fn wait_while_paused(&self) {
        while self
            .bridge
            .get_raw(SYS_PAUSE)
            .map(|v| crate::types::to_bool(&v))
            .unwrap_or(false)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if self.should_shutdown() {
                break;
            }
        }
    }

    fn is_step_mode(&self) -> bool {
        self.bridge
            .get_raw(SYS_STEP_MODE)
            .map(|v| crate::types::to_bool(&v))
            .unwrap_or(false)
    }

    async fn wait_for_step_trigger(&self) {
        loop {
            if self
                .bridge
                .get_raw(SYS_STEP_TRIGGER)
                .map(|v| crate::types::to_bool(&v))
                .unwrap_or(false)
            {
                self.bridge.set_raw(SYS_STEP_TRIGGER, Value::Bool(false));
                return;
            }
            if self.should_shutdown() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn consume_step_back(&mut self) -> bool {
        if !self.back_step_enabled {
            return false;
        }
        let requested = self
            .bridge
            .get_raw(SYS_STEP_BACK)
            .map(|v| crate::types::to_bool(&v))
            .unwrap_or(false);
        if !requested {
            return false;
        }
        self.bridge.set_raw(SYS_STEP_BACK, Value::Bool(false));
        if let Some(frame) = self.history.pop_back() {
            self.bridge.restore_state(frame.snapshot);
            self.current_node_id = frame.node_id;
            self.bridge
                .set_raw(SYS_NEXT_NODE, Value::String(self.current_node_id.clone()));
        }
        true
    }

    fn record_history(&mut self, node_id: &str) {
        if !self.back_step_enabled {
            return;
        }
        if self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(HistoryFrame {
            node_id: node_id.to_string(),
            snapshot: self.bridge.dump_state(),
        });
    }

    fn node_delay(&self) -> Duration {
        self.bridge
            .get_raw(SYS_NODE_DELAY_MS)
            .map(|v| crate::types::to_number(&v) as u64)
            .map(Duration::from_millis)
            .unwrap_or_default()
    }

    fn wake_due_timers(&mut self) {
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) =
            self.timers.drain(..).partition(|t| t.wake_at <= now);
        self.timers = pending;
        for entry in due {
            if scope::scope_cancelled(&self.bridge, &entry.scope) {
                continue;
            }
            self.trace.emit(
                TraceEvent::WaitingPulse {
                    node_id: &entry.node_id,
                    ms: entry.ms,
                }
                .to_string(),
            );
            for (port, value) in entry.outputs {
                self.write_port(&entry.node_id, &port, value);
            }
            self.bridge.set_raw(
                &active_ports_key(&entry.node_id),
                Value::Array(entry.active_ports.into_iter().map(Value::String).collect()),
            );
        }
    }

    /// Collects every node whose `_ActivePorts` is currently non-empty and
    /// clears it atomically-per-sweep (spec.md section 3's "write-once per
    /// activation" invariant), returning `(node_id, port)` pairs to fan out.
    fn collect_active_ports(&self) -> Vec<(String, String)> {
        let mut sweep = Vec::new();
        for node_id in self.graph.nodes.keys() {
            let key = active_ports_key(node_id);
            if let Some(Value::Array(ports)) = self.bridge.get_raw(&key) {
                if ports.is_empty() {
                    continue;
                }
                self.bridge.set_raw(&key, Value::Array(vec![]));
                for port in ports {
                    if let Some(port) = port.as_str() {
                        sweep.push((node_id.clone(), port.to_string()));
                    }
                }
            }
        }
        sweep
    }

    /// Fans a single `(node_id, port)` activation out to every wired target,
    /// in declaration order (spec.md section 4.5), resolving each target's
    /// inherited context stack from the source's `stack_overrides` for that
    /// port (falling back to the source's own stack when no override was
    /// set — spec.md section 4.5 step 2b).
    async fn fan_out(&mut self, node_id: &str, port: &str) -> Result<(), EngineError> {
        let targets = self.graph.wires.targets(node_id, port).to_vec();
        let inherited = self
            .node_stacks
            .get(node_id)
            .cloned()
            .unwrap_or_else(scope::root_stack);
        let resolved_stack = match self.node_stack_overrides.get(node_id) {
            Some(overrides) => overrides.resolve(port, &inherited),
            None => inherited,
        };

        for target in targets {
            self.trace.emit(
                TraceEvent::Flow {
                    src_node: node_id,
                    src_port: port,
                    dst_node: &target.to_node,
                    dst_port: &target.to_port,
                }
                .to_string(),
            );
            self.node_stacks
                .insert(target.to_node.clone(), resolved_stack.clone());
            self.activate(&target.to_node, &target.to_port).await?;
        }
        Ok(())
    }

    async fn activate(&mut self, node_id: &str, trigger_port: &str) -> Result<(), EngineError> {
        let Some(node) = self.graph.node(node_id).cloned() else {
            return Err(EngineError::UnknownNode(node_id.to_string()));
        };
        let Some(behavior) = self.graph.behavior(node_id).cloned() else {
            return Err(EngineError::UnknownNode(node_id.to_string()));
        };

        let context_stack: ContextStack = self
            .node_stacks
            .get(node_id)
            .cloned()
            .unwrap_or_else(scope::root_stack);

        // A provider's installed super-function overrides the generic
        // handler for any node sharing its capability name (spec.md section
        // 4.6's "super-function" precedence), resolved to the provider's
        // own `NodeBehavior` so `handle()` runs the provider's logic.
        let provider_scopes: Vec<String> = context_stack
            .iter()
            .filter_map(|s| self.bridge.scope_owner(s))
            .collect();
        let hijack = self
            .bridge
            .get_hijack_handler(&context_stack, &provider_scopes, &node.node_type)
            .and_then(|handler| self.graph.behavior(&handler.provider_id).cloned());

        let mut runtime_inputs = self.resolve_inputs(node_id);
        runtime_inputs.insert(
            "__ParentNodeId__".to_string(),
            Value::String(self.parent_key()),
        );
        let suspending_scope = scope::current_scope(&context_stack).to_string();

        self.current_node_id = node_id.to_string();
        self.bridge
            .set_raw(SYS_NEXT_NODE, Value::String(node_id.to_string()));
        self.record_history(node_id);
        self.trace.emit(TraceEvent::NodeStart(node_id).to_string());

        let outcome = self
            .dispatcher
            .dispatch(
                node.clone(),
                behavior,
                hijack,
                runtime_inputs,
                context_stack,
                trigger_port.to_string(),
                self.bridge.clone(),
                self.graph.project_name.clone(),
            )
            .await;

        self.trace.emit(TraceEvent::NodeStop(node_id).to_string());

        match outcome {
            Ok(HandlerOutcome::Completed {
                outputs,
                active_ports,
                stack_overrides,
            }) => {
                self.node_stack_overrides
                    .insert(node_id.to_string(), stack_overrides);
                for (port, value) in outputs {
                    self.write_port(node_id, &port, value);
                }
                self.bridge.set_raw(
                    &active_ports_key(node_id),
                    Value::Array(active_ports.into_iter().map(Value::String).collect()),
                );
                Ok(())
            }
            Ok(HandlerOutcome::Suspend {
                ms,
                outputs,
                active_ports,
                stack_overrides,
            }) => {
                self.node_stack_overrides
                    .insert(node_id.to_string(), stack_overrides);
                self.trace
                    .emit(TraceEvent::WaitingStart { node_id, ms }.to_string());
                self.timers.push(TimerEntry {
                    wake_at: Instant::now() + Duration::from_millis(ms),
                    node_id: node_id.to_string(),
                    scope: suspending_scope,
                    ms,
                    outputs,
                    active_ports,
                });
                Ok(())
            }
            Ok(HandlerOutcome::Aborted) => Ok(()),
            Err(EngineError::Handler(failed_node, error_object)) => {
                self.trace.emit(
                    TraceEvent::NodeError {
                        node_id: &failed_node,
                        message: &error_object.error_message,
                    }
                    .to_string(),
                );
                if node.output_schema.contains_key("Error") {
                    // `run_node` already wrote `["Error"]` to this node's
                    // active-ports; the next sweep fans it out normally.
                    Ok(())
                } else {
                    Err(EngineError::Handler(failed_node, error_object))
                }
            }
            Err(other) => Err(other),
        }
    }

    fn has_pending_work(&self) -> bool {
        if !self.timers.is_empty() {
            return true;
        }
        self.graph.nodes.keys().any(|id| {
            matches!(
                self.bridge.get_raw(&active_ports_key(id)),
                Some(Value::Array(v)) if !v.is_empty()
            )
        })
    }

    /// Runs the pulse loop to completion (spec.md section 4.5, step 7:
    /// terminates when there are no active ports, no parked branches, and
    /// no further work).
    pub async fn run(&mut self) -> Result<(), EngineError> {
        self.bootstrap();

        loop {
            if self.should_shutdown() {
                break;
            }
            self.control.poll(&self.bridge);
            self.wait_while_paused().await;
            if self.should_shutdown() {
                break;
            }
            if self.consume_step_back() {
                continue;
            }
            if matches!(self.bridge.get_raw("_SYNP_YIELD"), Some(Value::Bool(true))) {
                break;
            }

            self.wake_due_timers();

            let sweep = self.collect_active_ports();
            if sweep.is_empty() {
                if !self.has_pending_work() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                continue;
            }

            if self.is_step_mode() {
                self.wait_for_step_trigger().await;
            }

            for (node_id, port) in sweep {
                self.fan_out(&node_id, &port).await?;
            }

            let delay = self.node_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    /// Reads this run's harvested sub-graph return payload, if a `Return`
    /// node has fired (spec.md sections 4.8, 4.9).
    pub fn take_return_payload(&self) -> Option<HashMap<String, Value>> {
        let key = format!("SUBGRAPH_RETURN_{}", self.parent_key());
        self.bridge.get_raw(&key).and_then(|v| match v {
            Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        })
    }

    pub fn return_label(&self) -> Option<String> {
        self.bridge
            .get_raw("__RETURN_NODE_LABEL__")
            .and_then(|v| v.as_str().map(str::to_string))
    }
}
