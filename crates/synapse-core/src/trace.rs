//! Trace stream line formats (spec.md section 6). The editor consumes
//! these for live visualization; the CLI prints them to stdout unless
//! `--no-trace` is set.

use std::fmt;

pub enum TraceEvent<'a> {
    NodeStart(&'a str),
    NodeStop(&'a str),
    Flow {
        src_node: &'a str,
        src_port: &'a str,
        dst_node: &'a str,
        dst_port: &'a str,
    },
    WaitingStart { node_id: &'a str, ms: u64 },
    WaitingPulse { node_id: &'a str, ms: u64 },
    NodeError { node_id: &'a str, message: &'a str },
    SubgraphActivity,
    SubgraphFinished,
}

impl fmt::Display for TraceEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEvent::NodeStart(id) => write!(f, "[NODE_START] {id}"),
            TraceEvent::NodeStop(id) => write!(f, "[NODE_STOP] {id}"),
            TraceEvent::Flow {
                src_node,
                src_port,
                dst_node,
                dst_port,
            } => write!(f, "[FLOW] {src_node}:{src_port} -> {dst_node}:{dst_port}"),
            TraceEvent::WaitingStart { node_id, ms } => {
                write!(f, "[NODE_WAITING_START] {node_id} | {ms}")
            }
            TraceEvent::WaitingPulse { node_id, ms } => {
                write!(f, "[NODE_WAITING_PULSE] {node_id} | {ms}")
            }
            TraceEvent::NodeError { node_id, message } => {
                write!(f, "[NODE_ERROR] {node_id} | {message}")
            }
            TraceEvent::SubgraphActivity => write!(f, "[SYNP_SUBGRAPH_ACTIVITY]"),
            TraceEvent::SubgraphFinished => write!(f, "[SYNP_SUBGRAPH_FINISHED]"),
        }
    }
}

/// Sink for trace lines. The CLI implements this with a `println!`-backed
/// sink gated by `--no-trace`; tests implement it by pushing onto a `Vec`.
pub trait TraceSink: Send + Sync {
    fn emit(&self, line: String);
}

pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn emit(&self, line: String) {
        println!("{line}");
        tracing::debug!(target: "synapse::trace", "{line}");
    }
}

pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _line: String) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_flow_line() {
        let event = TraceEvent::Flow {
            src_node: "n",
            src_port: "Flow",
            dst_node: "r",
            dst_port: "Flow",
        };
        assert_eq!(event.to_string(), "[FLOW] n:Flow -> r:Flow");
    }

    #[test]
    fn formats_waiting_lines() {
        assert_eq!(
            TraceEvent::WaitingStart { node_id: "w", ms: 50 }.to_string(),
            "[NODE_WAITING_START] w | 50"
        );
    }
}
