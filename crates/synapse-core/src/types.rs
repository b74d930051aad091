//! TypeSystem: named data kinds and best-effort coercions between them.
//! Grounded on `synapse/core/types.py`'s `DataType`/`TypeCaster`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of data kinds a port may declare (spec.md section 3).
/// `Flow` and `ProviderFlow` are control tokens carrying no data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Flow,
    Any,
    String,
    Number,
    Boolean,
    List,
    Dict,
    Image,
    Color,
    Bytes,
    Password,
    ProviderFlow,
    Trigger,
    /// Compare-operator enum used by `For`'s `CompareType` port and the
    /// `Compare` leaf node (`<`, `<=`, `>`, `>=`, `==`, `!=`).
    CompareOperator,
}

impl DataKind {
    /// A short UI color hint, carried over from `schema.rs`'s `TYPE_COLORS`
    /// table for the in-scope subset of kinds.
    pub fn color_hint(&self) -> &'static str {
        match self {
            DataKind::Flow | DataKind::ProviderFlow | DataKind::Trigger => "#FFFFFF",
            DataKind::Any => "#AAAAAA",
            DataKind::String => "#E74C3C",
            DataKind::Number => "#3498DB",
            DataKind::Boolean => "#9B59B6",
            DataKind::List => "#F1C40F",
            DataKind::Dict => "#2ECC71",
            DataKind::Image => "#1ABC9C",
            DataKind::Color => "#E67E22",
            DataKind::Bytes => "#7F8C8D",
            DataKind::Password => "#34495E",
            DataKind::CompareOperator => "#BDC3C7",
        }
    }

    /// True for the two control-token kinds that never carry a payload.
    pub fn is_control_token(&self) -> bool {
        matches!(self, DataKind::Flow | DataKind::ProviderFlow)
    }

    /// Parses a graph document's port-schema name (e.g. `"Number"`) into a
    /// `DataKind`, used when a node's schema is declared dynamically from
    /// its loaded properties (Start's outputs, Return's inputs, SubGraph's
    /// derived ports).
    pub fn from_name(name: &str) -> Option<DataKind> {
        Some(match name {
            "Flow" => DataKind::Flow,
            "Any" => DataKind::Any,
            "String" => DataKind::String,
            "Number" => DataKind::Number,
            "Boolean" => DataKind::Boolean,
            "List" => DataKind::List,
            "Dict" => DataKind::Dict,
            "Image" => DataKind::Image,
            "Color" => DataKind::Color,
            "Bytes" => DataKind::Bytes,
            "Password" => DataKind::Password,
            "ProviderFlow" => DataKind::ProviderFlow,
            "Trigger" => DataKind::Trigger,
            "CompareOperator" => DataKind::CompareOperator,
            _ => return None,
        })
    }
}

/// Best-effort coercion of `value` to `kind`. Never fails: on a value that
/// cannot be meaningfully interpreted, returns the kind's zero value.
/// Coercion happens once per activation, on resolved inputs only, just
/// before the handler runs (spec.md section 4.2).
pub fn coerce(value: &Value, kind: DataKind) -> Value {
    match kind {
        DataKind::Any | DataKind::Flow | DataKind::ProviderFlow | DataKind::Trigger => {
            value.clone()
        }
        DataKind::Number => Value::from(to_number(value)),
        DataKind::Boolean => Value::Bool(to_bool(value)),
        DataKind::String | DataKind::Color | DataKind::CompareOperator => {
            Value::String(to_string_kind(value))
        }
        DataKind::List => to_list(value),
        DataKind::Dict => to_dict(value),
        DataKind::Password => Value::String(to_password(value)),
        DataKind::Image | DataKind::Bytes => value.clone(),
    }
}

/// Parses numerics; treats bool as 0/1; returns 0 on failure.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Treats "false", "0", "", "no", "off", null, and zero as false.
pub fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => {
            let lowered = s.trim().to_lowercase();
            !matches!(lowered.as_str(), "false" | "0" | "" | "no" | "off")
        }
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// JSON-encodes lists/dicts; other kinds use their natural string form.
pub fn to_string_kind(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
    }
}

/// Parses `[...]`-looking strings as JSON; otherwise wraps singletons in a
/// one-element list. Lists pass through unchanged.
pub fn to_list(value: &Value) -> Value {
    match value {
        Value::Array(_) => value.clone(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('[') {
                serde_json::from_str::<Value>(trimmed)
                    .unwrap_or_else(|_| Value::Array(vec![value.clone()]))
            } else {
                Value::Array(vec![value.clone()])
            }
        }
        Value::Null => Value::Array(vec![]),
        other => Value::Array(vec![other.clone()]),
    }
}

/// Parses `{...}`-looking strings as JSON; otherwise returns an empty
/// object. Dicts pass through unchanged.
pub fn to_dict(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('{') {
                serde_json::from_str::<Value>(trimmed)
                    .unwrap_or_else(|_| Value::Object(Default::default()))
            } else {
                Value::Object(Default::default())
            }
        }
        _ => Value::Object(Default::default()),
    }
}

/// Hashes via SHA-256 unless the value already looks like a 64-hex digest.
pub fn to_password(value: &Value) -> String {
    synapse_security::hashing::hash_password(&to_string_kind(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_from_bool_and_string() {
        assert_eq!(to_number(&json!(true)), 1.0);
        assert_eq!(to_number(&json!("3.5")), 3.5);
        assert_eq!(to_number(&json!("nope")), 0.0);
    }

    #[test]
    fn bool_falsy_strings() {
        for falsy in ["false", "0", "", "no", "off"] {
            assert!(!to_bool(&json!(falsy)), "{falsy} should be falsy");
        }
        assert!(to_bool(&json!("anything else")));
        assert!(!to_bool(&Value::Null));
    }

    #[test]
    fn string_json_encodes_collections() {
        assert_eq!(to_string_kind(&json!([1, 2])), "[1,2]");
        assert_eq!(to_string_kind(&json!("plain")), "plain");
    }

    #[test]
    fn list_wraps_singleton_and_parses_brackets() {
        assert_eq!(to_list(&json!(5)), json!([5]));
        assert_eq!(to_list(&json!("[1,2,3]")), json!([1, 2, 3]));
        assert_eq!(to_list(&json!("not a list")), json!(["not a list"]));
    }

    #[test]
    fn dict_parses_braces_else_empty() {
        assert_eq!(to_dict(&json!("{\"a\":1}")), json!({"a": 1}));
        assert_eq!(to_dict(&json!("nope")), json!({}));
    }

    #[test]
    fn password_hashes_unless_already_digest() {
        let hashed = to_password(&json!("hunter2"));
        assert_eq!(hashed.len(), 64);
        let digest = "b".repeat(64);
        assert_eq!(to_password(&json!(digest.clone())), digest);
    }
}
