//! Ordered migrations that bring a persisted document up to
//! `CURRENT_SCHEMA_VERSION` (spec.md section 6). Each step is independently
//! unit-tested; `migrate_document` applies all of them once the document's
//! declared version is below current, matching the legacy renames spec.md
//! section 6 names verbatim. A document already at or above current version
//! is returned unchanged, which is what makes `migrate(migrate(doc)) ==
//! migrate(doc)` hold (spec.md section 8's migration-idempotence property).

use serde_json::Value;

use crate::graph::CURRENT_SCHEMA_VERSION;

/// Renames snake_case property keys to "Title Case With Spaces", per
/// spec.md section 6.
fn rename_snake_case_properties(doc: &mut Value) -> bool {
    let mut changed = false;
    if let Some(nodes) = doc.get_mut("nodes").and_then(Value::as_array_mut) {
        for node in nodes {
            let Some(properties) = node.get_mut("properties").and_then(Value::as_object_mut)
            else {
                continue;
            };
            let renames: Vec<(String, String)> = properties
                .keys()
                .filter(|k| is_snake_case(k))
                .map(|k| (k.clone(), title_case(k)))
                .collect();
            for (old_key, new_key) in renames {
                if old_key == new_key {
                    continue;
                }
                if let Some(value) = properties.remove(&old_key) {
                    properties.insert(new_key, value);
                    changed = true;
                }
            }
        }
    }
    changed
}

fn is_snake_case(key: &str) -> bool {
    key.contains('_')
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn title_case(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Remaps legacy loop port names on wires: `Loop Flow -> Body`,
/// `Loop -> Continue`, `Exit -> Break` (spec.md section 6).
fn remap_legacy_loop_ports(doc: &mut Value) -> bool {
    const REMAP: &[(&str, &str)] = &[("Loop Flow", "Body"), ("Loop", "Continue"), ("Exit", "Break")];
    let mut changed = false;
    if let Some(wires) = doc.get_mut("wires").and_then(Value::as_array_mut) {
        for wire in wires {
            for port_field in ["from_port", "to_port"] {
                if let Some(Value::String(port)) = wire.get_mut(port_field) {
                    if let Some((_, new_name)) = REMAP.iter().find(|(old, _)| old == port) {
                        *port = new_name.to_string();
                        changed = true;
                    }
                }
            }
        }
    }
    changed
}

/// Normalizes a known set of legacy property keys: `additional_inputs ->
/// Additional Inputs`, `isolated_execution -> Isolated` (spec.md section 6).
fn normalize_legacy_keys(doc: &mut Value) -> bool {
    const REMAP: &[(&str, &str)] = &[
        ("additional_inputs", "Additional Inputs"),
        ("isolated_execution", "Isolated"),
    ];
    let mut changed = false;
    if let Some(nodes) = doc.get_mut("nodes").and_then(Value::as_array_mut) {
        for node in nodes {
            let Some(properties) = node.get_mut("properties").and_then(Value::as_object_mut)
            else {
                continue;
            };
            for (old_key, new_key) in REMAP {
                if let Some(value) = properties.remove(*old_key) {
                    properties.insert(new_key.to_string(), value);
                    changed = true;
                }
            }
        }
    }
    changed
}

type MigrationStep = fn(&mut Value) -> bool;

const MIGRATIONS: &[MigrationStep] = &[
    rename_snake_case_properties,
    remap_legacy_loop_ports,
    normalize_legacy_keys,
];

fn version_is_current(doc: &Value) -> bool {
    doc.get("version").and_then(Value::as_str) == Some(CURRENT_SCHEMA_VERSION)
}

/// Runs every migration step in order if `doc`'s declared version is below
/// `CURRENT_SCHEMA_VERSION`, then stamps the document at current version.
/// Returns whether anything changed. A document already at current version
/// is left untouched and reports no change.
pub fn migrate_document(mut doc: Value) -> (Value, bool) {
    if version_is_current(&doc) {
        return (doc, false);
    }

    let mut changed = false;
    for migration in MIGRATIONS {
        if migration(&mut doc) {
            changed = true;
        }
    }

    if let Some(root) = doc.as_object_mut() {
        root.insert(
            "version".to_string(),
            Value::String(CURRENT_SCHEMA_VERSION.to_string()),
        );
    }
    changed = true; // version stamp itself is a change the first time through
    (doc, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renames_snake_case_property_keys() {
        let mut doc = json!({
            "nodes": [{"id": "n1", "type": "Set Var", "properties": {"variable_name": "x"}}]
        });
        assert!(rename_snake_case_properties(&mut doc));
        assert_eq!(
            doc["nodes"][0]["properties"]["Variable Name"],
            json!("x")
        );
    }

    #[test]
    fn remaps_legacy_loop_port_names() {
        let mut doc = json!({
            "wires": [{"from_node": "w", "from_port": "Loop Flow", "to_node": "b", "to_port": "Flow"}]
        });
        assert!(remap_legacy_loop_ports(&mut doc));
        assert_eq!(doc["wires"][0]["from_port"], json!("Body"));
    }

    #[test]
    fn normalizes_legacy_property_keys() {
        let mut doc = json!({
            "nodes": [{"id": "n1", "type": "SubGraph", "properties": {"isolated_execution": true}}]
        });
        assert!(normalize_legacy_keys(&mut doc));
        assert_eq!(doc["nodes"][0]["properties"]["Isolated"], json!(true));
    }

    #[test]
    fn migration_is_idempotent() {
        let doc = json!({
            "version": "2.0.0",
            "nodes": [{"id": "n1", "type": "Set Var", "properties": {"variable_name": "x"}}],
            "wires": []
        });

        let (once, changed_once) = migrate_document(doc.clone());
        assert!(changed_once);
        let (twice, changed_twice) = migrate_document(once.clone());
        assert!(!changed_twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn current_version_document_is_untouched() {
        let doc = json!({"version": CURRENT_SCHEMA_VERSION, "nodes": [], "wires": []});
        let (out, changed) = migrate_document(doc.clone());
        assert!(!changed);
        assert_eq!(out, doc);
    }
}
