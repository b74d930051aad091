//! Directed connections from (source node, source port) to (target node,
//! target port) (spec.md section 3). Grounded on `transport.rs`'s
//! `GraphTopology` adjacency cache and its `update_graph_topology`
//! construction algorithm, generalized to carry both endpoints' port names
//! (that cache only needed the source port, since target routing went
//! through per-entity Inbox queues rather than named input ports).
//!
//! Unlike that continuously-rebuilt cache, this index is built once at load
//! time: the graph's wires are fixed for the life of a run (spec.md
//! section 3's Invariants — nodes and their declared ports never change
//! after load), so there is nothing to invalidate at runtime.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    pub from_node: String,
    pub from_port: String,
    pub to_node: String,
    pub to_port: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireTarget {
    pub to_node: String,
    pub to_port: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireSource {
    pub from_node: String,
    pub from_port: String,
}

#[derive(Default)]
pub struct WireTable {
    wires: Vec<Wire>,
    /// (node_id, port_name) -> targets, in declaration order, so fan-out
    /// pulses every target in the order the graph document declared them.
    adjacency: HashMap<(String, String), Vec<WireTarget>>,
    /// (node_id, port_name) -> sources feeding that input port, used to
    /// resolve a target's data-input arguments (spec.md section 4.5).
    reverse: HashMap<(String, String), Vec<WireSource>>,
}

impl WireTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, wire: Wire) {
        self.adjacency
            .entry((wire.from_node.clone(), wire.from_port.clone()))
            .or_default()
            .push(WireTarget {
                to_node: wire.to_node.clone(),
                to_port: wire.to_port.clone(),
            });
        self.reverse
            .entry((wire.to_node.clone(), wire.to_port.clone()))
            .or_default()
            .push(WireSource {
                from_node: wire.from_node.clone(),
                from_port: wire.from_port.clone(),
            });
        self.wires.push(wire);
    }

    /// Sources feeding `(node_id, port)`, in declaration order. A data input
    /// normally has at most one; the first is used when more than one wire
    /// targets the same input (spec.md section 3: "An input port may accept
    /// only one incoming wire per port except for the Bridge's implicit
    /// multi-producer path").
    pub fn sources(&self, node_id: &str, port: &str) -> &[WireSource] {
        self.reverse
            .get(&(node_id.to_string(), port.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn build(wires: Vec<Wire>) -> Self {
        let mut table = Self::new();
        for wire in wires {
            table.insert(wire);
        }
        table
    }

    /// Resolves the (possibly empty) list of wire targets from `(node, port)`,
    /// in declaration order — a single output port with multiple outgoing
    /// wires pulses all targets in this order (spec.md section 4.5).
    pub fn targets(&self, node_id: &str, port: &str) -> &[WireTarget] {
        self.adjacency
            .get(&(node_id.to_string(), port.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all(&self) -> &[Wire] {
        &self.wires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_preserves_declaration_order() {
        let table = WireTable::build(vec![
            Wire {
                from_node: "a".into(),
                from_port: "Flow".into(),
                to_node: "b".into(),
                to_port: "Flow".into(),
            },
            Wire {
                from_node: "a".into(),
                from_port: "Flow".into(),
                to_node: "c".into(),
                to_port: "Flow".into(),
            },
        ]);
        let targets = table.targets("a", "Flow");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].to_node, "b");
        assert_eq!(targets[1].to_node, "c");
    }

    #[test]
    fn missing_wire_returns_empty() {
        let table = WireTable::new();
        assert!(table.targets("x", "Flow").is_empty());
    }
}
