//! `StepsGroup`: a user-assembled pipeline of typed steps, each consuming
//! the previous step's output value and producing the next one. Emits
//! workflow lifecycle events around the pipeline and each step in
//! addition to any events forwarded from `Agent` steps.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{json, Value};

use super::router::Router;
use super::lifecycle_event;
use crate::agent::{Agent, AgentEvent, AgentInput, ExecContext, NodeKind};
use crate::error::{CoreError, Result};
use crate::stream::{pipe, Reader, Writer};

pub type StepFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;
pub type StepPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;
pub type StepStopCondition = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One node in a `StepsGroup` pipeline.
pub enum Step {
    Function {
        name: String,
        run: StepFn,
    },
    Agent {
        name: String,
        agent: Arc<dyn Agent>,
    },
    Condition {
        name: String,
        predicate: StepPredicate,
        if_true: Box<Step>,
        if_false: Box<Step>,
    },
    Parallel {
        name: String,
        steps: Vec<Step>,
    },
    LoopStep {
        name: String,
        inner: Box<Step>,
        max_iterations: u32,
        stop_condition: Option<StepStopCondition>,
    },
    RouterStep {
        name: String,
        router: Arc<Router>,
    },
    NestedSteps {
        name: String,
        group: Arc<StepsGroup>,
    },
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Function { name, .. }
            | Step::Agent { name, .. }
            | Step::Condition { name, .. }
            | Step::Parallel { name, .. }
            | Step::LoopStep { name, .. }
            | Step::RouterStep { name, .. }
            | Step::NestedSteps { name, .. } => name,
        }
    }
}

/// Runs one step to completion, threading the prior step's output value
/// in and returning its output value. Any `Agent`/`Router` sub-stream
/// events are forwarded into `writer` with `step_name` metadata; the
/// step's output is the JSON value of its final event's content, or
/// `Value::Null` if the step produced no events.
fn run_step<'a>(
    step: &'a Step,
    ctx: &'a ExecContext,
    input: Value,
    writer: &'a mut Writer<AgentEvent>,
) -> BoxFuture<'a, Result<Value>> {
    Box::pin(async move {
        match step {
            Step::Function { run, .. } => run(input).await,
            Step::Agent { name, agent } => {
                let child_ctx = ctx.child(name.clone());
                let branch = child_ctx.branch.clone();
                let agent_input = AgentInput::text("user", input.to_string());
                let mut reader = agent.execute(child_ctx, agent_input).await;
                let mut last = Value::Null;
                let step_name = name.clone();
                let mut forwarded = 0u64;
                loop {
                    match reader.recv().await {
                        Ok(event) => {
                            let progress = lifecycle_event(
                                &step_name,
                                &step_name,
                                &branch,
                                "step_progress",
                                json!({ "step_name": step_name, "events_forwarded": forwarded }),
                            );
                            if writer.send(progress).await {
                                return Err(CoreError::Cancelled);
                            }
                            forwarded += 1;

                            last = serde_json::to_value(&event.content).unwrap_or(Value::Null);
                            let stamped = event.with_meta("step_name", step_name.clone()).with_branch(branch.clone());
                            if writer.send(stamped).await {
                                return Err(CoreError::Cancelled);
                            }
                        }
                        Err(e) if e.is_end_of_stream() => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(last)
            }
            Step::Condition { predicate, if_true, if_false, .. } => {
                let branch = if predicate(&input) { if_true.as_ref() } else { if_false.as_ref() };
                run_step(branch, ctx, input, writer).await
            }
            Step::Parallel { steps, name } => {
                let mut outputs = Vec::with_capacity(steps.len());
                for (i, sub) in steps.iter().enumerate() {
                    let sub_ctx = ctx.child(format!("{name}.{i}"));
                    outputs.push(run_step(sub, &sub_ctx, input.clone(), writer).await?);
                }
                Ok(Value::Array(outputs))
            }
            Step::LoopStep { inner, max_iterations, stop_condition, name } => {
                let mut current = input;
                for k in 0..(*max_iterations).max(1) {
                    let iter_ctx = ctx.child(format!("{name}.iter{k}"));
                    current = run_step(inner, &iter_ctx, current, writer).await?;
                    if let Some(cond) = stop_condition {
                        if cond(&current) {
                            break;
                        }
                    }
                }
                Ok(current)
            }
            Step::RouterStep { router, name } => {
                let child_ctx = ctx.child(name.clone());
                let agent_input = AgentInput::text("user", input.to_string());
                let router_agent: &dyn Agent = router.as_ref();
                let mut reader = router_agent.execute(child_ctx, agent_input).await;
                let mut last = Value::Null;
                loop {
                    match reader.recv().await {
                        Ok(event) => {
                            last = serde_json::to_value(&event.content).unwrap_or(Value::Null);
                            if writer.send(event).await {
                                return Err(CoreError::Cancelled);
                            }
                        }
                        Err(e) if e.is_end_of_stream() => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(last)
            }
            Step::NestedSteps { group, name } => {
                let child_ctx = ctx.child(name.clone());
                run_inner(group, child_ctx, input, writer).await
            }
        }
    })
}

async fn run_inner(
    group: &StepsGroup,
    ctx: ExecContext,
    initial: Value,
    writer: &mut Writer<AgentEvent>,
) -> Result<Value> {
    let total = group.steps.len();
    let mut current = initial;
    for (i, step) in group.steps.iter().enumerate() {
        let started = lifecycle_event(
            &group.name,
            step.name(),
            &ctx.branch,
            "step_started",
            json!({ "step_index": i, "step_name": step.name(), "total_steps": total }),
        );
        if writer.send(started).await {
            return Err(CoreError::Cancelled);
        }

        current = run_step(step, &ctx, current, writer).await?;

        let mut completed_body = json!({ "step_index": i, "step_name": step.name() });
        if let Step::NestedSteps { group: nested, .. } = step {
            if let Value::Object(ref mut map) = completed_body {
                map.insert(
                    "nested_steps".into(),
                    json!({
                        "group_name": nested.name,
                        "step_count": nested.steps.len(),
                        "step_names": nested.steps.iter().map(Step::name).collect::<Vec<_>>(),
                    }),
                );
            }
        }
        let completed = lifecycle_event(&group.name, step.name(), &ctx.branch, "step_completed", completed_body);
        if writer.send(completed).await {
            return Err(CoreError::Cancelled);
        }
    }
    Ok(current)
}

pub struct StepsGroup {
    name: String,
    steps: Arc<Vec<Step>>,
}

impl StepsGroup {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        StepsGroup {
            name: name.into(),
            steps: Arc::new(steps),
        }
    }
}

#[async_trait]
impl Agent for StepsGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::StepsGroup
    }

    async fn execute(&self, ctx: ExecContext, input: AgentInput) -> Reader<AgentEvent> {
        let (mut writer, reader) = pipe(128);
        let name = self.name.clone();
        let steps = self.steps.clone();
        let initial = input
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or(Value::Null);

        tokio::spawn(async move {
            let group = StepsGroup { name: name.clone(), steps };

            let started = lifecycle_event(&name, &name, &ctx.branch, "workflow_started", json!({}));
            if writer.send(started).await {
                return;
            }

            match run_inner(&group, ctx.clone(), initial, &mut writer).await {
                Ok(result) => {
                    let completed = lifecycle_event(
                        &name,
                        &name,
                        &ctx.branch,
                        "workflow_completed",
                        json!({ "result": result }),
                    );
                    if writer.send(completed).await {
                        return;
                    }
                    writer.close();
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    writer.fail(e).await;
                }
            }
        });

        reader
    }
}
