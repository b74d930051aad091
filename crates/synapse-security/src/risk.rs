use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node types the original system flagged outright, regardless of substring
/// matching below.
const RISKY_NODES: &[&str] = &[
    "Shell Command",
    "Python Exec",
    "System Process",
    "Eval Expression",
];

/// A soft warning surfaced to the caller before the graph runs. Never blocks
/// execution; the Engine does not consult this module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskFinding {
    pub node_id: String,
    pub node_type: String,
    pub reason: String,
}

/// Scans a raw graph document (as deserialized JSON) for node types that
/// warrant a warning: an explicit hardcoded list, plus any type name
/// containing `process` or `exec` (case-insensitive).
pub fn scan_for_risks(document: &Value) -> Vec<RiskFinding> {
    let mut findings = Vec::new();

    let Some(nodes) = document.get("nodes").and_then(Value::as_array) else {
        return findings;
    };

    for node in nodes {
        let node_type = node.get("type").and_then(Value::as_str).unwrap_or("");
        let node_id = node.get("id").and_then(Value::as_str).unwrap_or("");
        let lowered = node_type.to_lowercase();

        if RISKY_NODES.iter().any(|risky| risky.eq_ignore_ascii_case(node_type)) {
            findings.push(RiskFinding {
                node_id: node_id.to_string(),
                node_type: node_type.to_string(),
                reason: format!("node type '{node_type}' is on the risky-node list"),
            });
        } else if lowered.contains("process") || lowered.contains("exec") {
            findings.push(RiskFinding {
                node_id: node_id.to_string(),
                node_type: node_type.to_string(),
                reason: format!("node type '{node_type}' matches a process/exec pattern"),
            });
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_hardcoded_risky_type() {
        let doc = json!({
            "nodes": [{"id": "n1", "type": "Shell Command"}]
        });
        let findings = scan_for_risks(&doc);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].node_id, "n1");
    }

    #[test]
    fn flags_process_exec_substring() {
        let doc = json!({
            "nodes": [{"id": "n1", "type": "Custom Process Runner"}]
        });
        let findings = scan_for_risks(&doc);
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn ignores_benign_nodes() {
        let doc = json!({
            "nodes": [{"id": "n1", "type": "Add"}]
        });
        assert!(scan_for_risks(&doc).is_empty());
    }

    #[test]
    fn missing_nodes_key_is_empty() {
        let doc = json!({});
        assert!(scan_for_risks(&doc).is_empty());
    }
}
