//! The Bridge: a scoped, process-safe key/value store that decouples node
//! producers from consumers (spec.md section 4.1). Grounded on
//! `store/blob.rs`'s `Arc<RwLock<HashMap<...>>>` concurrency pattern,
//! generalized from an opaque-blob store to a typed JSON value store plus a
//! parallel object side table and atomic counters.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

pub const ROOT_SCOPE: &str = "Root";

/// A node-installed replacement handler reference. The engine stores the
/// function *name* here; `Dispatcher` resolves it against the node-behavior
/// registry, per spec.md section 9's "typed registry mapping
/// `(scope_id, capability_id)` to a function value" re-architecture note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HijackHandler {
    pub provider_id: String,
    pub function_name: String,
}

#[derive(Default)]
struct BridgeInner {
    values: RwLock<HashMap<String, Value>>,
    counters: RwLock<HashMap<String, AtomicI64>>,
    objects: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    /// `{scope}_Provider_{type} -> node_id`, used by `get_provider_id`.
    provider_scopes: RwLock<HashMap<String, String>>,
    /// `scope_id -> owning provider node_id`, used by `Provider End` to find
    /// which provider's super-functions to tear down without having to
    /// already know that provider's `provider_type`.
    scope_owners: RwLock<HashMap<String, String>>,
    /// `provider_id -> {function_name -> HijackHandler}`.
    super_functions: RwLock<HashMap<String, HashMap<String, HijackHandler>>>,
}

/// Shared, thread-safe key/value store. Cloning a `Bridge` clones the
/// `Arc`, giving every clone a handle to the same underlying state — the
/// same sharing model as `store/blob.rs`'s `BlobStore`. One Bridge is
/// instantiated per graph run (spec.md section 9); sub-graphs get a fresh
/// child Bridge (see `subgraph.rs`).
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            inner: Arc::new(BridgeInner::default()),
        }
    }
}

fn scoped_key(scope: &str, name: &str) -> String {
    format!("{scope}:{name}")
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes atomically; overwrites. `source` is recorded for trace only.
    pub fn set(&self, key: &str, value: Value, scope: &str, _source: &str) {
        let composed = scoped_key(scope, key);
        self.inner.values.write().unwrap().insert(composed, value);
    }

    /// Writes a raw (non-scope-qualified) key, used for port-UUID traffic
    /// and well-known global control keys.
    pub fn set_raw(&self, key: &str, value: Value) {
        self.inner
            .values
            .write()
            .unwrap()
            .insert(key.to_string(), value);
    }

    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.inner.values.read().unwrap().get(key).cloned()
    }

    /// Reads the current value: current scope first, then falls back to the
    /// root scope, then a bare (non-scope-qualified) key.
    pub fn get(&self, key: &str, scope: &str) -> Option<Value> {
        let guard = self.inner.values.read().unwrap();
        if let Some(v) = guard.get(&scoped_key(scope, key)) {
            return Some(v.clone());
        }
        if scope != ROOT_SCOPE {
            if let Some(v) = guard.get(&scoped_key(ROOT_SCOPE, key)) {
                return Some(v.clone());
            }
        }
        guard.get(key).cloned()
    }

    /// Writes at an outer (by name) scope, not the current one.
    pub fn bubble_set(&self, name: &str, value: Value, scope: &str, _source: &str) {
        self.set(name, value, scope, _source);
    }

    /// Atomic counter; used by loops for iteration index under concurrent
    /// pulses.
    pub fn increment(&self, key: &str, delta: i64) -> i64 {
        let guard = self.inner.counters.read().unwrap();
        if let Some(counter) = guard.get(key) {
            return counter.fetch_add(delta, Ordering::SeqCst) + delta;
        }
        drop(guard);
        let mut guard = self.inner.counters.write().unwrap();
        let counter = guard
            .entry(key.to_string())
            .or_insert_with(|| AtomicI64::new(0));
        counter.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn counter_value(&self, key: &str) -> i64 {
        self.inner
            .counters
            .read()
            .unwrap()
            .get(key)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Side table for opaque, non-serializable handles. Keys never cross a
    /// process boundary.
    pub fn set_object(&self, key: &str, handle: Arc<dyn Any + Send + Sync>) {
        self.inner
            .objects
            .write()
            .unwrap()
            .insert(key.to_string(), handle);
    }

    pub fn get_object(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.objects.read().unwrap().get(key).cloned()
    }

    /// Registers `{scope}_Provider_{type} = node_id`, called when a provider
    /// node pushes a new scope (spec.md section 4.6).
    pub fn register_provider_scope(&self, scope: &str, provider_type: &str, node_id: &str) {
        let key = format!("{scope}_Provider_{provider_type}");
        self.inner
            .provider_scopes
            .write()
            .unwrap()
            .insert(key, node_id.to_string());
        self.inner
            .scope_owners
            .write()
            .unwrap()
            .insert(scope.to_string(), node_id.to_string());
    }

    /// The provider node_id that pushed `scope`, if any.
    pub fn scope_owner(&self, scope: &str) -> Option<String> {
        self.inner.scope_owners.read().unwrap().get(scope).cloned()
    }

    /// Walks the stack from top to root, returning the node_id of the
    /// nearest scope whose provider-type tag matches; null otherwise. No
    /// per-node caching is performed (see `DESIGN.md`'s Open Question
    /// resolution for why).
    pub fn get_provider_id(&self, context_stack: &[String], provider_type: &str) -> Option<String> {
        let guard = self.inner.provider_scopes.read().unwrap();
        for scope in context_stack.iter().rev() {
            let key = format!("{scope}_Provider_{provider_type}");
            if let Some(node_id) = guard.get(&key) {
                return Some(node_id.clone());
            }
        }
        None
    }

    /// Lets a provider install an override (e.g. a browser-automation
    /// provider replaces a generic `Click` handler).
    pub fn register_super_function(&self, provider_id: &str, function_name: &str) {
        let mut guard = self.inner.super_functions.write().unwrap();
        guard
            .entry(provider_id.to_string())
            .or_default()
            .insert(
                function_name.to_string(),
                HijackHandler {
                    provider_id: provider_id.to_string(),
                    function_name: function_name.to_string(),
                },
            );
    }

    /// Checks whether any provider currently on `stack` has installed a
    /// super-function named `function_name`; nearest scope wins.
    pub fn get_hijack_handler(
        &self,
        context_stack: &[String],
        provider_scope_ids: &[String],
        function_name: &str,
    ) -> Option<HijackHandler> {
        let guard = self.inner.super_functions.read().unwrap();
        for provider_id in provider_scope_ids.iter().rev() {
            if let Some(fns) = guard.get(provider_id) {
                if let Some(handler) = fns.get(function_name) {
                    return Some(handler.clone());
                }
            }
        }
        let _ = context_stack;
        None
    }

    /// Called on scope teardown.
    pub fn unregister_super_functions(&self, provider_id: &str) {
        self.inner.super_functions.write().unwrap().remove(provider_id);
    }

    /// Snapshot for the watch UI and back-step.
    pub fn dump_state(&self) -> HashMap<String, Value> {
        self.inner.values.read().unwrap().clone()
    }

    /// Restores a prior snapshot wholesale, used by the Engine's back-step
    /// handling (spec.md section 4.5, step 5).
    pub fn restore_state(&self, snapshot: HashMap<String, Value>) {
        *self.inner.values.write().unwrap() = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scoped_get_falls_back_to_root_then_bare() {
        let bridge = Bridge::new();
        bridge.set_raw("bare", json!(1));
        assert_eq!(bridge.get("bare", "child"), Some(json!(1)));

        bridge.set("shadowed", json!("root"), ROOT_SCOPE, "test");
        assert_eq!(bridge.get("shadowed", "child"), Some(json!("root")));

        bridge.set("shadowed", json!("child"), "child", "test");
        assert_eq!(bridge.get("shadowed", "child"), Some(json!("child")));
        assert_eq!(bridge.get("shadowed", ROOT_SCOPE), Some(json!("root")));
    }

    #[test]
    fn increment_is_atomic_per_key() {
        let bridge = Bridge::new();
        assert_eq!(bridge.increment("idx", 1), 1);
        assert_eq!(bridge.increment("idx", 1), 2);
        assert_eq!(bridge.increment("idx", 3), 5);
        assert_eq!(bridge.counter_value("idx"), 5);
    }

    #[test]
    fn provider_scope_discovery_nearest_wins() {
        let bridge = Bridge::new();
        bridge.register_provider_scope("A", "T", "node_a");
        bridge.register_provider_scope("B", "U", "node_b");
        let stack = vec![ROOT_SCOPE.to_string(), "A".to_string(), "B".to_string()];
        assert_eq!(
            bridge.get_provider_id(&stack, "T"),
            Some("node_a".to_string())
        );
        assert_eq!(bridge.get_provider_id(&stack, "V"), None);
    }

    #[test]
    fn hijack_precedence_nearest_provider_wins() {
        let bridge = Bridge::new();
        bridge.register_super_function("node_a", "Click");
        let handler = bridge.get_hijack_handler(&[], &["node_a".to_string()], "Click");
        assert!(handler.is_some());
        bridge.unregister_super_functions("node_a");
        assert!(bridge
            .get_hijack_handler(&[], &["node_a".to_string()], "Click")
            .is_none());
    }
}
