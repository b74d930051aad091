//! The headless CLI described in spec.md section 6: loads a graph document
//! (or runs a built-in demo with no arguments), migrates it if needed, runs
//! a static risk scan, and drives the Engine to completion, printing the
//! trace stream to stdout unless `--no-trace` is set.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use synapse_core::bridge::Bridge;
use synapse_core::engine::{ControlSource, Engine, EngineConfig};
use synapse_core::error::LoadError;
use synapse_core::graph::{self, GraphDocument};
use synapse_core::migrations::migrate_document;
use synapse_core::nodes::default_registry;
use synapse_core::trace::{NullSink, StdoutSink};

#[derive(Parser, Debug)]
#[command(name = "synapse", about = "Runs a Synapse visual-scripting graph to completion")]
struct Cli {
    /// Graph JSON path. Omit to run a small built-in demo graph.
    file: Option<PathBuf>,

    /// Per-node delay, in seconds, used to slow the pulse loop down for
    /// visualization.
    #[arg(long)]
    speed: Option<f64>,

    /// Pause the run for as long as this file exists.
    #[arg(long)]
    pause_file: Option<PathBuf>,

    /// Re-read the per-node delay (in seconds) from this file every pulse.
    #[arg(long)]
    speed_file: Option<PathBuf>,

    /// Stop the run gracefully as soon as this file exists.
    #[arg(long)]
    stop_file: Option<PathBuf>,

    /// Suppress the per-node trace lines.
    #[arg(long)]
    no_trace: bool,
}

/// Polls the `--pause-file` / `--speed-file` / `--stop-file` flags against
/// the filesystem once per engine iteration and writes the corresponding
/// well-known Bridge control keys (spec.md section 6).
struct FileControlSource {
    pause_file: Option<PathBuf>,
    speed_file: Option<PathBuf>,
    stop_file: Option<PathBuf>,
    base_delay_ms: u64,
}

impl ControlSource for FileControlSource {
    fn poll(&self, bridge: &Bridge) {
        let paused = self.pause_file.as_ref().is_some_and(|path| path.exists());
        bridge.set_raw("_SYSTEM_PAUSE", serde_json::Value::Bool(paused));

        let stopped = self.stop_file.as_ref().is_some_and(|path| path.exists());
        if stopped {
            bridge.set_raw("_SYSTEM_SHUTDOWN", serde_json::Value::Bool(true));
        }

        let delay_ms = self
            .speed_file
            .as_ref()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|contents| contents.trim().parse::<f64>().ok())
            .map(|seconds| (seconds * 1000.0) as u64)
            .unwrap_or(self.base_delay_ms);
        bridge.set_raw("_SYSTEM_NODE_DELAY_MS", serde_json::Value::from(delay_ms));
    }
}

/// `Start -> Add(2, 3) -> Return` — enough to exercise the pulse loop with
/// no graph file on disk.
fn demo_document() -> GraphDocument {
    let json = serde_json::json!({
        "version": graph::CURRENT_SCHEMA_VERSION,
        "project_name": "synapse-cli-demo",
        "project_category": "demo",
        "project_description": "Start -> Add -> Return",
        "project_vars": {},
        "nodes": [
            {
                "id": "start",
                "type": "Start",
                "name": "Start",
                "properties": { "Outputs": { "A": "Number", "B": "Number" }, "A": 2, "B": 3 }
            },
            {
                "id": "add",
                "type": "Add",
                "name": "Add",
                "properties": {}
            },
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
        ],
        "embedded_subgraphs": {}
    });
    serde_json::from_value(json).expect("demo document is well-formed")
}

fn load_document(path: &PathBuf) -> anyhow::Result<GraphDocument> {
    let raw = std::fs::read_to_string(path)?;
    let mut value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| LoadError::MalformedJson(e.to_string()))?;

    let (migrated, changed) = migrate_document(value.clone());
    value = migrated;
    if changed {
        tracing::info!(path = %path.display(), "migrated graph document to current schema version");
        if let Ok(pretty) = serde_json::to_string_pretty(&value) {
            let _ = std::fs::write(path, pretty);
        }
    }

    graph::validate_graph(&value)?;
    Ok(serde_json::from_value(value)?)
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let document = match &cli.file {
        Some(path) => match load_document(path) {
            Ok(doc) => doc,
            Err(err) => {
                eprintln!("fatal: failed to load graph document: {err:#}");
                return std::process::ExitCode::from(1);
            }
        },
        None => demo_document(),
    };

    let risk_target = serde_json::to_value(&document).unwrap_or_default();
    for finding in synapse_security::risk::scan_for_risks(&risk_target) {
        tracing::warn!(
            node_id = %finding.node_id,
            node_type = %finding.node_type,
            reason = %finding.reason,
            "risky node type found in graph document"
        );
    }

    let registry = default_registry();
    let graph = match graph::load_graph(&document, &registry) {
        Ok(graph) => graph,
        Err(err) => {
            eprintln!("fatal: failed to build graph: {err:#}");
            return std::process::ExitCode::from(1);
        }
    };

    let base_delay_ms = cli.speed.map(|seconds| (seconds * 1000.0) as u64).unwrap_or(0);
    let control: Arc<dyn ControlSource> = Arc::new(FileControlSource {
        pause_file: cli.pause_file,
        speed_file: cli.speed_file,
        stop_file: cli.stop_file,
        base_delay_ms,
    });

    let config = EngineConfig {
        trace: if cli.no_trace {
            Arc::new(NullSink)
        } else {
            Arc::new(StdoutSink)
        },
        control,
        ..EngineConfig::default()
    };

    let mut engine = Engine::new(Arc::new(graph), Bridge::new(), None, config);
    match engine.run().await {
        Ok(()) => std::process::ExitCode::from(0),
        Err(err) => {
            eprintln!("fatal: engine run failed: {err:#}");
            std::process::ExitCode::from(1)
        }
    }
}
