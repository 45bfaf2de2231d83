//! The `Loop` composite: repeats an inner sequence of sub-agents until a
//! stop condition or iteration cap is reached. `max_iterations = 1`
//! degenerates to plain `Sequential`.

use std::sync::Arc;

use async_trait::async_trait;

use super::forward_all;
use crate::agent::{Agent, AgentEvent, AgentInput, ExecContext, NodeKind};
use crate::error::CoreError;
use crate::stream::{pipe, Reader};

pub type StopCondition = Arc<dyn Fn(&AgentEvent) -> bool + Send + Sync>;

pub struct LoopAgent {
    name: String,
    children: Vec<Arc<dyn Agent>>,
    max_iterations: u32,
    stop_condition: Option<StopCondition>,
}

impl LoopAgent {
    pub fn new(name: impl Into<String>, children: Vec<Arc<dyn Agent>>) -> Self {
        LoopAgent {
            name: name.into(),
            children,
            max_iterations: 1,
            stop_condition: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_stop_condition(mut self, stop_condition: StopCondition) -> Self {
        self.stop_condition = Some(stop_condition);
        self
    }
}

#[async_trait]
impl Agent for LoopAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Loop
    }

    async fn execute(&self, ctx: ExecContext, input: AgentInput) -> Reader<AgentEvent> {
        let (mut writer, reader) = pipe(128);
        let children = self.children.clone();
        let max_iterations = self.max_iterations.max(1);
        let stop_condition = self.stop_condition.clone();
        let name = self.name.clone();

        tokio::spawn(async move {
            'iterations: for k in 0..max_iterations {
                if ctx.is_cancelled() {
                    writer.fail(CoreError::Cancelled).await;
                    return;
                }

                let iter_ctx = ExecContext {
                    cancel: ctx.cancel.child_token(),
                    branch: format!("{}.iter{}", ctx.branch, k),
                };

                for (idx, child) in children.iter().enumerate() {
                    let child_name = child.name().to_string();
                    let child_ctx = iter_ctx.child(&child_name);
                    let branch = child_ctx.branch.clone();
                    let mut child_reader = child.execute(child_ctx, input.clone()).await;

                    let stop_condition = stop_condition.clone();
                    let stop_flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
                    let stop_flag_for_closure = stop_flag.clone();
                    let name_for_stamp = name.clone();
                    let result = forward_all(&mut child_reader, &mut writer, move |event| {
                        let event = event
                            .with_meta("loop_iteration", k as u64)
                            .with_meta("sub_agent_index", idx as u64)
                            .with_meta("loop_agent", name_for_stamp.clone())
                            .with_branch(branch.clone());
                        if let Some(cond) = &stop_condition {
                            if cond(&event) {
                                stop_flag_for_closure.store(true, std::sync::atomic::Ordering::Relaxed);
                            }
                        }
                        event
                    });

                    match result.await {
                        Ok(()) => {}
                        Err(e) if e.is_cancelled() => return,
                        Err(e) => {
                            writer.fail(e).await;
                            return;
                        }
                    }

                    if stop_flag.load(std::sync::atomic::Ordering::Relaxed) {
                        break 'iterations;
                    }
                }
            }
            writer.close();
        });

        reader
    }
}
