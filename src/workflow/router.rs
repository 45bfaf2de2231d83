//! The `Router` composite: selects the next step(s) via a user-supplied
//! function rather than fixed ordering. `Simple` picks exactly one route,
//! `Chain` a fixed list run in sequence, `Dynamic` re-evaluates after
//! every emitted event so routing can change mid-stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::forward_all;
use crate::agent::{Agent, AgentEvent, AgentInput, ExecContext, NodeKind};
use crate::error::CoreError;
use crate::stream::{pipe, Reader};

pub type RouteSelector = Arc<dyn Fn(&AgentInput) -> String + Send + Sync>;
pub type ChainSelector = Arc<dyn Fn(&AgentInput) -> Vec<String> + Send + Sync>;
/// Called with the most recent event (`None` before the first route is
/// picked) to choose the next route key, or `None` to stop.
pub type DynamicSelector = Arc<dyn Fn(Option<&AgentEvent>) -> Option<String> + Send + Sync>;

pub enum RouterMode {
    Simple(RouteSelector),
    Chain(ChainSelector),
    Dynamic(DynamicSelector),
}

pub struct Router {
    name: String,
    routes: HashMap<String, Arc<dyn Agent>>,
    mode: RouterMode,
}

impl Router {
    pub fn new(name: impl Into<String>, routes: HashMap<String, Arc<dyn Agent>>, mode: RouterMode) -> Self {
        Router {
            name: name.into(),
            routes,
            mode,
        }
    }
}

#[async_trait]
impl Agent for Router {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Router
    }

    async fn execute(&self, ctx: ExecContext, input: AgentInput) -> Reader<AgentEvent> {
        let (mut writer, reader) = pipe(128);
        let routes = self.routes.clone();
        let keys: Vec<String> = match &self.mode {
            RouterMode::Simple(selector) => vec![selector(&input)],
            RouterMode::Chain(selector) => selector(&input),
            RouterMode::Dynamic(_) => Vec::new(),
        };
        let dynamic_next = match &self.mode {
            RouterMode::Dynamic(next) => Some(next.clone()),
            _ => None,
        };

        tokio::spawn(async move {
            if let Some(next) = dynamic_next {
                let mut last_event: Option<AgentEvent> = None;
                loop {
                    let Some(key) = next(last_event.as_ref()) else {
                        break;
                    };
                    let Some(agent) = routes.get(&key) else {
                        writer.fail(CoreError::UnknownRoute(key)).await;
                        return;
                    };
                    let child_ctx = ctx.child(format!("Router.{key}"));
                    let branch = child_ctx.branch.clone();
                    let mut child_reader = agent.execute(child_ctx, input.clone()).await;
                    let key_for_stamp = key.clone();
                    let mut observed = None;
                    loop {
                        match child_reader.recv().await {
                            Ok(event) => {
                                let event = event.with_meta("router_key", key_for_stamp.clone()).with_branch(branch.clone());
                                observed = Some(event.clone());
                                if writer.send(event).await {
                                    return;
                                }
                            }
                            Err(e) if e.is_end_of_stream() => break,
                            Err(e) => {
                                writer.fail(e).await;
                                return;
                            }
                        }
                    }
                    last_event = observed;
                }
                writer.close();
                return;
            }

            for key in keys {
                let Some(agent) = routes.get(&key) else {
                    writer.fail(CoreError::UnknownRoute(key)).await;
                    return;
                };
                let child_ctx = ctx.child(format!("Router.{key}"));
                let branch = child_ctx.branch.clone();
                let mut child_reader = agent.execute(child_ctx, input.clone()).await;
                let key_for_stamp = key.clone();
                let result = forward_all(&mut child_reader, &mut writer, move |event| {
                    event.with_meta("router_key", key_for_stamp.clone()).with_branch(branch.clone())
                });
                match result.await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return,
                    Err(e) => {
                        writer.fail(e).await;
                        return;
                    }
                }
            }
            writer.close();
        });

        reader
    }
}
