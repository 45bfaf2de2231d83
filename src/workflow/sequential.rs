//! The `Sequential` composite: runs sub-agents one after another, in
//! listed order, on a single shared input.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{forward_all, lifecycle_event};
use crate::agent::{Agent, AgentInput, ExecContext, NodeKind};
use crate::stream::pipe;

pub struct Sequential {
    name: String,
    children: Vec<Arc<dyn Agent>>,
    stop_on_error: bool,
}

impl Sequential {
    pub fn new(name: impl Into<String>, children: Vec<Arc<dyn Agent>>) -> Self {
        Sequential {
            name: name.into(),
            children,
            stop_on_error: true,
        }
    }

    /// When `false`, a failing sub-agent is recorded as a monitor-channel
    /// style lifecycle event and the next sub-agent still runs.
    pub fn with_stop_on_error(mut self, stop_on_error: bool) -> Self {
        self.stop_on_error = stop_on_error;
        self
    }
}

#[async_trait]
impl Agent for Sequential {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Sequential
    }

    async fn execute(&self, ctx: ExecContext, input: AgentInput) -> crate::stream::Reader<crate::agent::AgentEvent> {
        let (mut writer, reader) = pipe(128);
        let children = self.children.clone();
        let name = self.name.clone();
        let stop_on_error = self.stop_on_error;
        let total_steps = children.len();

        tokio::spawn(async move {
            for (i, child) in children.iter().enumerate() {
                if ctx.is_cancelled() {
                    writer.fail(crate::error::CoreError::Cancelled).await;
                    return;
                }

                let child_name = child.name().to_string();
                let child_ctx = ctx.child(&child_name);
                let branch = child_ctx.branch.clone();
                let mut child_reader = child.execute(child_ctx, input.clone()).await;

                let step = i + 1;
                let stamp_name = child_name.clone();
                let stamp_branch = branch.clone();
                let result = forward_all(&mut child_reader, &mut writer, move |event| {
                    event
                        .with_meta("sequential_step", step as u64)
                        .with_meta("sequential_agent", stamp_name.clone())
                        .with_meta("total_steps", total_steps as u64)
                        .with_branch(stamp_branch.clone())
                });

                match result.await {
                    Ok(()) => {}
                    Err(e) if e.is_cancelled() => return,
                    Err(e) => {
                        if stop_on_error {
                            writer.fail(e).await;
                            return;
                        }
                        let event = lifecycle_event(
                            &name,
                            &child_name,
                            &branch,
                            "step_failed",
                            json!({ "sequential_step": step, "error": e.to_string() }),
                        );
                        if writer.send(event).await {
                            return;
                        }
                    }
                }
            }
            writer.close();
        });

        reader
    }
}
