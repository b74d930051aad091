//! Stable unique IDs for every (node, port, direction) triple, and bridge
//! key derivation from them (spec.md section 3 / section 4.4). Assigned on
//! first mention at load time and frozen for the life of the run.

use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PortKey {
    node_id: String,
    port_name: String,
    direction: Direction,
}

/// Assigns and looks up stable UUIDs for `(node_id, port_name, direction)`.
#[derive(Default)]
pub struct PortRegistry {
    ids: HashMap<PortKey, Uuid>,
}

impl PortRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this port's UUID, assigning a fresh one on first mention.
    pub fn assign(&mut self, node_id: &str, port_name: &str, direction: Direction) -> Uuid {
        let key = PortKey {
            node_id: node_id.to_string(),
            port_name: port_name.to_string(),
            direction,
        };
        *self.ids.entry(key).or_insert_with(Uuid::new_v4)
    }

    pub fn lookup(&self, node_id: &str, port_name: &str, direction: Direction) -> Option<Uuid> {
        let key = PortKey {
            node_id: node_id.to_string(),
            port_name: port_name.to_string(),
            direction,
        };
        self.ids.get(&key).copied()
    }

    /// The authoritative Bridge key for this port: its UUID, if assigned.
    pub fn bridge_key(&self, node_id: &str, port_name: &str, direction: Direction) -> String {
        self.lookup(node_id, port_name, direction)
            .map(|id| id.to_string())
            .unwrap_or_else(|| legacy_bridge_key(node_id, port_name))
    }
}

/// Legacy `{node_id}_{port_name}` key, supported for backward compatibility
/// when no UUID has been assigned (e.g. ports discovered dynamically).
pub fn legacy_bridge_key(node_id: &str, port_name: &str) -> String {
    format!("{node_id}_{port_name}")
}
