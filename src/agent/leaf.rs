//! Leaf agent: drives one reasoning loop against a `Provider`, dispatching
//! `Tool` calls through the `SmartApprove` permission policy, and
//! emitting `AgentEvent`s for every chunk, tool call and result.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::approval::Approval;
use super::event::AgentEvent;
use super::fallback::FallbackManager;
use super::permission::{smart_approve, PermissionDecision};
use super::provider::{Chunk, CompletionOptions, Provider, ProviderMessage, ToolSpec};
use super::tool::{Tool, ToolContext};
use super::{Agent, AgentInput, ExecContext};
use crate::bus::{EventPayload, ToolCaller};
use crate::error::CoreError;
use crate::stream::{pipe, Reader};

/// State names are stable identifiers; they exist mainly for tracing and
/// for tests that assert on transition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeafState {
    Idle,
    Preparing,
    Calling,
    ToolDispatch,
    Finalizing,
    Done,
    Failed,
    Cancelled,
}

pub struct LeafAgent {
    id: String,
    name: String,
    system_prompt: Option<String>,
    fallback: FallbackManager,
    tools: HashMap<String, Arc<dyn Tool>>,
    approval: Option<Arc<dyn Approval>>,
    max_tool_iterations: u32,
}

impl LeafAgent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        LeafAgent {
            id: id.into(),
            name: name.into(),
            system_prompt: None,
            fallback: FallbackManager::new(vec![provider]),
            tools: HashMap::new(),
            approval: None,
            max_tool_iterations: 25,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Appends a lower-priority provider, tried only once every provider
    /// ahead of it in the list has exhausted its retries.
    pub fn with_fallback_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.fallback.push_provider(provider);
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    pub fn with_approval(mut self, approval: Arc<dyn Approval>) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_max_tool_iterations(mut self, n: u32) -> Self {
        self.max_tool_iterations = n;
        self
    }

    fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
                allowed_callers: Vec::new(),
            })
            .collect()
    }
}

#[async_trait]
impl Agent for LeafAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: ExecContext, input: AgentInput) -> Reader<AgentEvent> {
        let (mut writer, reader) = pipe::<AgentEvent>(64);
        let id = self.id.clone();
        let name = self.name.clone();
        let branch = ctx.branch.clone();
        let fallback = self.fallback.clone();
        let tools = self.tools.clone();
        let approval = self.approval.clone();
        let system_prompt = self.system_prompt.clone();
        let tool_specs = self.tool_specs();
        let max_iterations = self.max_tool_iterations;

        tokio::spawn(async move {
            let mut state = LeafState::Preparing;
            let mut messages = Vec::new();
            if let Some(prompt) = &system_prompt {
                messages.push(ProviderMessage {
                    role: "system".into(),
                    content: serde_json::Value::String(prompt.clone()),
                });
            }
            messages.extend(input.messages);

            let options = CompletionOptions {
                tools: tool_specs,
                ..Default::default()
            };

            let mut iterations = 0u32;
            'loop_: loop {
                if ctx.is_cancelled() {
                    state = LeafState::Cancelled;
                    writer.fail(CoreError::Cancelled).await;
                    break 'loop_;
                }

                match state {
                    LeafState::Preparing => {
                        debug!(agent = %name, "preparing");
                        state = LeafState::Calling;
                    }
                    LeafState::Calling => {
                        let mut stream = match fallback.stream(&messages, &options).await {
                            Ok(s) => s,
                            Err(e) => {
                                warn!(agent = %name, error = %e, "every provider failed");
                                writer.fail(e).await;
                                break 'loop_;
                            }
                        };

                        let mut pending_tools = Vec::new();
                        let mut step = 0u64;
                        loop {
                            match stream.recv().await {
                                Ok(Chunk::TextDelta(delta)) => {
                                    step += 1;
                                    let event = AgentEvent::new(
                                        id.clone(),
                                        name.clone(),
                                        branch.clone(),
                                        EventPayload::ProgressTextChunk { step, delta },
                                    );
                                    if writer.send(event).await {
                                        state = LeafState::Cancelled;
                                        break;
                                    }
                                }
                                Ok(Chunk::ToolUse { id: call_id, name: tool_name, input: tool_input }) => {
                                    let event = AgentEvent::new(
                                        id.clone(),
                                        name.clone(),
                                        branch.clone(),
                                        EventPayload::ToolUse {
                                            id: call_id.clone(),
                                            name: tool_name.clone(),
                                            input: tool_input.clone(),
                                            caller: Some(ToolCaller {
                                                kind: "model".into(),
                                                tool_id: None,
                                            }),
                                        },
                                    );
                                    if writer.send(event).await {
                                        state = LeafState::Cancelled;
                                        break;
                                    }
                                    pending_tools.push((call_id, tool_name, tool_input));
                                }
                                Ok(Chunk::Usage(_)) => {}
                                Ok(Chunk::Error(message)) => {
                                    warn!(agent = %name, %message, "recoverable provider stream error");
                                    let event = AgentEvent::new(
                                        id.clone(),
                                        name.clone(),
                                        branch.clone(),
                                        EventPayload::Custom(json!({
                                            "kind": "provider_stream_error",
                                            "message": message,
                                        })),
                                    );
                                    if writer.send(event).await {
                                        state = LeafState::Cancelled;
                                        break;
                                    }
                                }
                                Err(e) if e.is_end_of_stream() => break,
                                Err(e) => {
                                    warn!(agent = %name, error = %e, "provider stream error");
                                    writer.fail(e).await;
                                    break 'loop_;
                                }
                            }
                        }

                        if matches!(state, LeafState::Cancelled | LeafState::Failed) {
                            break 'loop_;
                        }

                        if pending_tools.is_empty() {
                            state = LeafState::Finalizing;
                        } else {
                            iterations += 1;
                            if iterations > max_iterations {
                                warn!(agent = %name, "max tool iterations reached");
                                state = LeafState::Finalizing;
                            } else {
                                state = LeafState::ToolDispatch;
                                for (call_id, tool_name, tool_input) in pending_tools {
                                    let result = dispatch_tool(
                                        &tools,
                                        approval.as_ref(),
                                        &call_id,
                                        &tool_name,
                                        tool_input,
                                        &id,
                                        ctx.cancel.child_token(),
                                    )
                                    .await;

                                    let event = AgentEvent::new(
                                        id.clone(),
                                        name.clone(),
                                        branch.clone(),
                                        EventPayload::ToolResult {
                                            id: call_id,
                                            output: result.as_ref().ok().cloned(),
                                            error: result.as_ref().err().cloned(),
                                        },
                                    );
                                    if writer.send(event).await {
                                        state = LeafState::Cancelled;
                                        break;
                                    }

                                    messages.push(ProviderMessage {
                                        role: "tool".into(),
                                        content: json!({ "name": tool_name, "result": result.unwrap_or_else(|e| json!({"error": e})) }),
                                    });
                                }
                                if state == LeafState::Cancelled {
                                    break 'loop_;
                                }
                                state = LeafState::Calling;
                            }
                        }
                    }
                    LeafState::Finalizing => {
                        let event = AgentEvent::new(id.clone(), name.clone(), branch.clone(), EventPayload::ProgressDone);
                        writer.send(event).await;
                        state = LeafState::Done;
                    }
                    LeafState::Done => {
                        writer.close();
                        break 'loop_;
                    }
                    LeafState::ToolDispatch | LeafState::Idle | LeafState::Failed | LeafState::Cancelled => {
                        break 'loop_;
                    }
                }
            }
        });

        reader
    }
}

async fn dispatch_tool(
    tools: &HashMap<String, Arc<dyn Tool>>,
    approval: Option<&Arc<dyn Approval>>,
    call_id: &str,
    tool_name: &str,
    input: serde_json::Value,
    agent_id: &str,
    cancel: CancellationToken,
) -> Result<serde_json::Value, String> {
    let Some(tool) = tools.get(tool_name) else {
        return Err(format!("unknown tool '{tool_name}'"));
    };

    let decision = smart_approve(&tool.annotations());
    if decision == PermissionDecision::RequireApproval {
        let approved = match approval {
            Some(approver) => approver
                .request(tool_name, &input, "tool requires approval")
                .await
                .map(|d| d.approved)
                .unwrap_or(false),
            None => false,
        };
        if !approved {
            return Err(CoreError::PermissionDenied(tool_name.to_string()).to_string());
        }
    }

    let ctx = ToolContext {
        call_id: call_id.to_string(),
        agent_id: agent_id.to_string(),
    };
    tool.execute(input, &ctx, cancel).await.map_err(|e| e.to_string())
}
