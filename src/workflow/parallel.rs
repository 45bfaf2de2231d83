//! The `Parallel` composite: runs every sub-agent concurrently and merges
//! their streams into one output stream.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::lifecycle_event;
use crate::agent::{Agent, AgentEvent, AgentInput, ExecContext, NodeKind};
use crate::error::CoreError;
use crate::stream::{pipe, Reader};

enum Merged {
    Event(usize, String, AgentEvent),
    Error(usize, String, CoreError),
    Done,
}

pub struct Parallel {
    name: String,
    children: Vec<Arc<dyn Agent>>,
    fail_fast: bool,
}

impl Parallel {
    pub fn new(name: impl Into<String>, children: Vec<Arc<dyn Agent>>) -> Self {
        Parallel {
            name: name.into(),
            children,
            fail_fast: false,
        }
    }

    /// When set, the first sub-agent error cancels every sibling and
    /// terminates the parent stream with that error. Already-buffered
    /// sibling events are flushed to the caller first (see DESIGN.md).
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

#[async_trait]
impl Agent for Parallel {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Parallel
    }

    async fn execute(&self, ctx: ExecContext, input: AgentInput) -> Reader<AgentEvent> {
        let (mut writer, reader) = pipe(128);
        let children = self.children.clone();
        let fail_fast = self.fail_fast;
        let name = self.name.clone();

        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel::<Merged>(256);
            let mut child_ctxs = Vec::with_capacity(children.len());

            for (i, child) in children.iter().enumerate() {
                let child_name = child.name().to_string();
                let child_ctx = ctx.child(format!("Parallel.{child_name}"));
                child_ctxs.push(child_ctx.clone());

                let tx = tx.clone();
                let child = child.clone();
                let input = input.clone();
                tokio::spawn(async move {
                    let mut reader = child.execute(child_ctx, input).await;
                    loop {
                        match reader.recv().await {
                            Ok(event) => {
                                if tx.send(Merged::Event(i, child_name.clone(), event)).await.is_err() {
                                    return;
                                }
                            }
                            Err(e) if e.is_end_of_stream() => {
                                let _ = tx.send(Merged::Done).await;
                                return;
                            }
                            Err(e) => {
                                let _ = tx.send(Merged::Error(i, child_name.clone(), e)).await;
                                return;
                            }
                        }
                    }
                });
            }
            drop(tx);

            let mut remaining = children.len();
            while remaining > 0 {
                match rx.recv().await {
                    Some(Merged::Event(i, child_name, event)) => {
                        let event = event
                            .with_meta("parallel_index", i as u64)
                            .with_meta("parallel_agent", child_name);
                        if writer.send(event).await {
                            return;
                        }
                    }
                    Some(Merged::Done) => remaining -= 1,
                    Some(Merged::Error(i, child_name, err)) => {
                        if fail_fast {
                            // Flush whatever is already buffered from
                            // siblings before surfacing the terminal
                            // error; no further polling afterward.
                            while let Ok(buffered) = rx.try_recv() {
                                if let Merged::Event(j, cn, event) = buffered {
                                    let event = event
                                        .with_meta("parallel_index", j as u64)
                                        .with_meta("parallel_agent", cn);
                                    if writer.send(event).await {
                                        return;
                                    }
                                }
                            }
                            for child_ctx in &child_ctxs {
                                child_ctx.cancel.cancel();
                            }
                            writer.fail(err).await;
                            return;
                        }
                        let event = lifecycle_event(
                            &name,
                            &child_name,
                            &ctx.branch,
                            "sub_agent_failed",
                            serde_json::json!({ "parallel_index": i, "error": err.to_string() }),
                        );
                        if writer.send(event).await {
                            return;
                        }
                        remaining -= 1;
                    }
                    None => break,
                }
            }
            writer.close();
        });

        reader
    }
}
