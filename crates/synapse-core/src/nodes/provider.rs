//! `Provider` / `Provider End`: the scope-push/scope-pop pair that backs
//! capability hijacking (spec.md section 4.6). A provider pushes a fresh
//! scope onto the stack its `Flow` output fans out through, registers
//! itself as that scope's `{Provider Type}` owner, and optionally installs
//! super-functions that override a plain node's handler by type name for
//! anything activated inside its scope. `Provider End` looks up which
//! provider owns the *current* scope (the top of its own inherited stack)
//! via `Bridge::scope_owner`, so no property has to link the two nodes
//! together explicitly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::LoadError;
use crate::graph::{LoaderContext, NodeDocument, NodeFactory};
use crate::node::{HandlerContext, HandlerOutcome, NodeBehavior, NodeFlags};
use crate::scope::{pop_scope, push_scope, StackOverrides};
use crate::types::DataKind;

pub struct ProviderNode {
    provider_type: String,
    capabilities: Vec<String>,
}

#[async_trait]
impl NodeBehavior for ProviderNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([("Flow".to_string(), DataKind::Flow)])
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([("Flow".to_string(), DataKind::ProviderFlow)])
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags {
            is_native: true,
            is_service: true,
            ..Default::default()
        }
    }

    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        _trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        let scope_id = format!("{}::{}", ctx.node.id, Uuid::new_v4());
        ctx.bridge
            .register_provider_scope(&scope_id, &self.provider_type, &ctx.node.id);
        for capability in &self.capabilities {
            ctx.bridge.register_super_function(&ctx.node.id, capability);
        }

        let mut overrides = StackOverrides::new();
        overrides.set("Flow", push_scope(&ctx.context_stack, &scope_id));

        Ok(HandlerOutcome::Completed {
            outputs: HashMap::new(),
            active_ports: vec!["Flow".to_string()],
            stack_overrides: overrides,
        })
    }
}

pub struct ProviderFactory;

impl NodeFactory for ProviderFactory {
    fn create(
        &self,
        doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        let provider_type = doc
            .properties
            .get("Provider Type")
            .and_then(Value::as_str)
            .unwrap_or(doc.id.as_str())
            .to_string();
        let capabilities = doc
            .properties
            .get("Capabilities")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Ok(Arc::new(ProviderNode {
            provider_type,
            capabilities,
        }))
    }
}

pub struct ProviderEndNode;

#[async_trait]
impl NodeBehavior for ProviderEndNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([("Flow".to_string(), DataKind::ProviderFlow)])
    }

    fn output_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([("Flow".to_string(), DataKind::Flow)])
    }

    fn flags(&self) -> NodeFlags {
        NodeFlags {
            is_native: true,
            ..Default::default()
        }
    }

    async fn handle(
        &self,
        ctx: &HandlerContext<'_>,
        _trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        let scope_id = ctx.current_scope().to_string();
        if let Some(provider_id) = ctx.bridge.scope_owner(&scope_id) {
            ctx.bridge.unregister_super_functions(&provider_id);
        }

        let mut overrides = StackOverrides::new();
        overrides.set("Flow", pop_scope(&ctx.context_stack, &scope_id));

        Ok(HandlerOutcome::Completed {
            outputs: HashMap::new(),
            active_ports: vec!["Flow".to_string()],
            stack_overrides: overrides,
        })
    }
}

pub struct ProviderEndFactory;

impl NodeFactory for ProviderEndFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(ProviderEndNode))
    }
}
