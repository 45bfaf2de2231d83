//! Leaf agents and the shared `Agent` contract every workflow composite
//! also implements.

pub mod approval;
pub mod event;
pub mod fallback;
mod leaf;
pub mod permission;
pub mod provider;
pub mod tool;

pub use approval::{Approval, ApprovalDecision};
pub use event::{AgentEvent, EventActions};
pub use fallback::FallbackManager;
pub use leaf::LeafAgent;
pub use provider::{Chunk, CompletionOptions, Provider, ProviderMessage, Response, ToolSpec, Usage};
pub use tool::{Annotations, Tool, ToolContext};

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::stream::Reader;

/// Input handed to `Agent::execute`: the conversation so far plus
/// free-form metadata composites use to carry routing state.
#[derive(Clone, Debug, Default)]
pub struct AgentInput {
    pub messages: Vec<ProviderMessage>,
    pub metadata: HashMap<String, Value>,
}

impl AgentInput {
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        AgentInput {
            messages: vec![ProviderMessage {
                role: role.into(),
                content: Value::String(content.into()),
            }],
            metadata: HashMap::new(),
        }
    }
}

/// Threaded through every `Execute` call and every sub-task it spawns;
/// cancelling the root token propagates to every descendant.
#[derive(Clone)]
pub struct ExecContext {
    pub cancel: CancellationToken,
    pub branch: String,
}

impl ExecContext {
    pub fn root() -> Self {
        ExecContext {
            cancel: CancellationToken::new(),
            branch: "Root".to_string(),
        }
    }

    /// A child context for a nested sub-agent: shares the cancellation
    /// token (child-cancel-on-parent-cancel) but extends the branch path.
    pub fn child(&self, segment: impl std::fmt::Display) -> Self {
        ExecContext {
            cancel: self.cancel.child_token(),
            branch: format!("{}.{}", self.branch, segment),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What kind of node in the workflow tree an `Agent` is. Every composite
/// overrides `Agent::kind()` to report its own variant; plain leaf agents
/// inherit the default. Re-exported as `workflow::Node` for callers that
/// want to dispatch on shape (e.g. a UI rendering the tree) without
/// downcasting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Leaf,
    Sequential,
    Parallel,
    Loop,
    Router,
    StepsGroup,
}

/// The contract shared by leaf agents and every workflow composite:
/// drive work and return a finite stream of events. Represented as a
/// plain trait (composites store `Box<dyn Agent>` children) rather than a
/// tagged enum purely for extensibility — the workflow layer's own
/// composites additionally expose a tag for dispatch where that helps
/// (see `workflow::Node`).
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: ExecContext, input: AgentInput) -> Reader<AgentEvent>;

    /// Reports this node's shape in the workflow tree. Leaf agents never
    /// need to override it; every workflow composite does.
    fn kind(&self) -> NodeKind {
        NodeKind::Leaf
    }
}
