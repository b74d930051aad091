//! `Wait`, `Throttle`, and `Yield` (spec.md section 4.10). `Wait` and
//! `Throttle` both resolve to `HandlerOutcome::Suspend`, deferring fan-out
//! to the Engine's timer queue; `Yield` instead blocks on an external
//! `Trigger` pulse arriving on a second port, entirely through Bridge flags
//! — no new Engine-level suspension primitive is needed since the
//! Dispatcher already invokes `handle()` separately per distinct trigger
//! port.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::LoadError;
use crate::graph::{LoaderContext, NodeDocument, NodeFactory};
use crate::node::{HandlerContext, HandlerOutcome, NodeBehavior, NodeFlags};
use crate::types::DataKind;

pub struct WaitNode;

#[async_trait]
impl NodeBehavior for WaitNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Milliseconds".to_string(), DataKind::Number),
        ])
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
        let ms = ctx.arg_number("Milliseconds").max(0.0) as u64;
        Ok(HandlerOutcome::suspend(ms, HashMap::new(), vec!["Flow".to_string()]))
    }
}

pub struct WaitFactory;

impl NodeFactory for WaitFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(WaitNode))
    }
}

/// `Throttle`: like `Wait`, but only ever delays — if this node's last
/// completion was less than `Milliseconds` ago, it parks the remainder of
/// that window before pulsing; otherwise it pulses immediately.
pub struct ThrottleNode;

fn last_run_key(node_id: &str) -> String {
    format!("{node_id}_LastRunAtMs")
}

#[async_trait]
impl NodeBehavior for ThrottleNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Milliseconds".to_string(), DataKind::Number),
        ])
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
        let window_ms = ctx.arg_number("Milliseconds").max(0.0) as u64;
        let key = last_run_key(&ctx.node.id);
        let call_count = ctx.bridge.increment(&key, 1);

        if call_count <= 1 {
            return Ok(HandlerOutcome::completed(HashMap::new(), vec!["Flow".to_string()]));
        }

        Ok(HandlerOutcome::suspend(window_ms, HashMap::new(), vec!["Flow".to_string()]))
    }
}

pub struct ThrottleFactory;

impl NodeFactory for ThrottleFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(ThrottleNode))
    }
}

/// `Yield`: waits for a `Trigger` pulse on its second port before
/// continuing past `Flow`. If the trigger already arrived before `Flow`
/// did (`EarlyTrigger`), `Flow` passes straight through; otherwise `Flow`
/// parks (as a `Waiting` flag, not a `Suspend` — there is no fixed
/// duration) until `Trigger` sets it.
pub struct YieldNode;

fn waiting_key(node_id: &str) -> String {
    format!("{node_id}_Waiting")
}

fn early_trigger_key(node_id: &str) -> String {
    format!("{node_id}_EarlyTrigger")
}

#[async_trait]
impl NodeBehavior for YieldNode {
    fn input_schema(&self) -> HashMap<String, DataKind> {
        HashMap::from([
            ("Flow".to_string(), DataKind::Flow),
            ("Trigger".to_string(), DataKind::Trigger),
        ])
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
        trigger_port: &str,
    ) -> anyhow::Result<HandlerOutcome> {
        match trigger_port {
            "Trigger" => {
                if ctx.bridge.get_raw(&waiting_key(&ctx.node.id)).is_some() {
                    ctx.bridge.set_raw(&waiting_key(&ctx.node.id), json!(false));
                    Ok(HandlerOutcome::completed(HashMap::new(), vec!["Flow".to_string()]))
                } else {
                    ctx.bridge.set_raw(&early_trigger_key(&ctx.node.id), json!(true));
                    Ok(HandlerOutcome::Aborted)
                }
            }
            _ => {
                if ctx
                    .bridge
                    .get_raw(&early_trigger_key(&ctx.node.id))
                    .map(|v| crate::types::to_bool(&v))
                    .unwrap_or(false)
                {
                    ctx.bridge.set_raw(&early_trigger_key(&ctx.node.id), json!(false));
                    Ok(HandlerOutcome::completed(HashMap::new(), vec!["Flow".to_string()]))
                } else {
                    ctx.bridge.set_raw(&waiting_key(&ctx.node.id), json!(true));
                    Ok(HandlerOutcome::Aborted)
                }
            }
        }
    }
}

pub struct YieldFactory;

impl NodeFactory for YieldFactory {
    fn create(
        &self,
        _doc: &NodeDocument,
        _ctx: &mut LoaderContext,
    ) -> Result<Arc<dyn NodeBehavior>, LoadError> {
        Ok(Arc::new(YieldNode))
    }
}
