//! Context Stack and Scope/Provider lifecycle plumbing (spec.md sections 3
//! and 4.6). A context stack is an ordered list of scope identifiers; the
//! outermost (root) scope is always present.

use std::collections::HashMap;

use crate::bridge::{Bridge, ROOT_SCOPE};

pub type ContextStack = Vec<String>;

pub fn root_stack() -> ContextStack {
    vec![ROOT_SCOPE.to_string()]
}

pub fn current_scope(stack: &ContextStack) -> &str {
    stack.last().map(String::as_str).unwrap_or(ROOT_SCOPE)
}

/// Per-port stack substitution a pulse source may request for its
/// fan-out targets. Loops use this to enter/leave iteration scopes by
/// overriding the stack used for their `Body` port pulse (spec.md section
/// 4.5, step 2b, and section 4.7).
#[derive(Debug, Clone, Default)]
pub struct StackOverrides {
    overrides: HashMap<String, ContextStack>,
}

impl StackOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, port: impl Into<String>, stack: ContextStack) {
        self.overrides.insert(port.into(), stack);
    }

    /// Resolves the stack to use for a pulse on `port`, falling back to the
    /// source activation's own (inherited) stack when no override exists.
    pub fn resolve(&self, port: &str, inherited: &ContextStack) -> ContextStack {
        self.overrides
            .get(port)
            .cloned()
            .unwrap_or_else(|| inherited.clone())
    }
}

/// Pushes a fresh named scope for a provider node's `Flow` activation.
pub fn push_scope(stack: &ContextStack, scope_id: &str) -> ContextStack {
    let mut next = stack.clone();
    next.push(scope_id.to_string());
    next
}

/// Pops a named scope from `stack`, if present, wherever it occurs (not
/// just the top) — a provider ending out of strict LIFO order still removes
/// its own scope from any stack referencing it (spec.md section 4.6, step
/// 3 under `Provider End`).
pub fn pop_scope(stack: &ContextStack, scope_id: &str) -> ContextStack {
    stack.iter().filter(|s| s.as_str() != scope_id).cloned().collect()
}

/// The key used to test a loop's or provider's cooperative cancellation
/// flag for a given scope (spec.md sections 4.5, 4.7, 5).
pub fn cancel_scope_key(scope_id: &str) -> String {
    format!("SYNAPSE_CANCEL_SCOPE_{scope_id}")
}

pub fn scope_cancelled(bridge: &Bridge, scope_id: &str) -> bool {
    bridge
        .get_raw(&cancel_scope_key(scope_id))
        .map(|v| crate::types::to_bool(&v))
        .unwrap_or(false)
}

pub fn cancel_scope(bridge: &Bridge, scope_id: &str) {
    bridge.set_raw(&cancel_scope_key(scope_id), serde_json::Value::Bool(true));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_scope() {
        let root = root_stack();
        let pushed = push_scope(&root, "scope-1");
        assert_eq!(pushed, vec!["Root".to_string(), "scope-1".to_string()]);
        let popped = pop_scope(&pushed, "scope-1");
        assert_eq!(popped, root);
    }

    #[test]
    fn stack_overrides_fall_back_to_inherited() {
        let mut overrides = StackOverrides::new();
        let inherited = root_stack();
        assert_eq!(overrides.resolve("Body", &inherited), inherited);

        overrides.set("Body", push_scope(&inherited, "loop-1"));
        assert_eq!(
            overrides.resolve("Body", &inherited),
            vec!["Root".to_string(), "loop-1".to_string()]
        );
    }

    #[test]
    fn cancel_flag_roundtrip() {
        let bridge = Bridge::new();
        assert!(!scope_cancelled(&bridge, "loop-1"));
        cancel_scope(&bridge, "loop-1");
        assert!(scope_cancelled(&bridge, "loop-1"));
    }
}
