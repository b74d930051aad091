//! The built-in node library (spec.md sections 4.2, 4.7, 4.8, 4.9, 4.10).
//! Each node type is a zero-sized `NodeBehavior` plus a matching
//! `NodeFactory`; `default_registry` wires every built-in type name to its
//! factory the way a real deployment's bootstrap would, generalizing
//! `components/mod.rs`'s per-category module split (`agent`, `compute`,
//! `control`, `logic`, `manipulation`, ...) into one `nodes` module scoped
//! to this crate's much smaller, fixed node vocabulary.

pub mod loop_core;
pub mod math;
pub mod provider;
pub mod return_node;
pub mod start;
pub mod subgraph;
pub mod timing;
pub mod variables;

use std::sync::Arc;

use crate::graph::NodeRegistry;

/// Registers every built-in node type under its canonical graph-document
/// `type` string.
pub fn default_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register("Start", Arc::new(start::StartFactory));
    registry.register("Return", Arc::new(return_node::ReturnFactory));
    registry.register("Add", Arc::new(math::AddFactory));
    registry.register("Compare", Arc::new(math::CompareFactory));
    registry.register("Set Var", Arc::new(variables::SetVarFactory));
    registry.register("Provider", Arc::new(provider::ProviderFactory));
    registry.register("Provider End", Arc::new(provider::ProviderEndFactory));
    registry.register("While", Arc::new(loop_core::WhileFactory));
    registry.register("For", Arc::new(loop_core::ForFactory));
    registry.register("ForEach", Arc::new(loop_core::ForEachFactory));
    registry.register("SubGraph", Arc::new(subgraph::SubGraphFactory));
    registry.register("Wait", Arc::new(timing::WaitFactory));
    registry.register("Throttle", Arc::new(timing::ThrottleFactory));
    registry.register("Yield", Arc::new(timing::YieldFactory));
    registry
}
