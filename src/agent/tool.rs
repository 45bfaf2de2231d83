//! The Tool capability and the annotation set `SmartApprove` reads.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Declares the blast radius of a tool so permission policy can decide
/// without inspecting its implementation. `risk_level` is clamped to
/// `[0, 4]` by [`Annotations::new`]; construct with that rather than the
/// struct literal when `risk_level` comes from anywhere other than a
/// compile-time constant.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Annotations {
    pub read_only: bool,
    pub destructive: bool,
    pub idempotent: bool,
    pub open_world: bool,
    pub risk_level: u8,
    /// Free-form grouping used by permission policy and UIs, e.g.
    /// `"filesystem"`, `"network"`, `"code_execution"`.
    pub category: String,
    pub requires_confirmation: bool,
}

pub const MAX_RISK_LEVEL: u8 = 4;

impl Annotations {
    pub fn new(category: impl Into<String>, risk_level: u8) -> Self {
        Annotations {
            category: category.into(),
            risk_level: risk_level.min(MAX_RISK_LEVEL),
            ..Default::default()
        }
    }

    pub fn with_read_only(mut self, v: bool) -> Self {
        self.read_only = v;
        self
    }

    pub fn with_destructive(mut self, v: bool) -> Self {
        self.destructive = v;
        self
    }

    pub fn with_idempotent(mut self, v: bool) -> Self {
        self.idempotent = v;
        self
    }

    pub fn with_open_world(mut self, v: bool) -> Self {
        self.open_world = v;
        self
    }

    pub fn with_requires_confirmation(mut self, v: bool) -> Self {
        self.requires_confirmation = v;
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolContext {
    pub call_id: String,
    pub agent_id: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn annotations(&self) -> Annotations;

    /// `cancel` is the in-flight call's own cancellation context: it
    /// fires when the enclosing agent's `ExecContext` is cancelled, and
    /// implementations that wrap long-running or external work should
    /// race it against their own I/O rather than ignore it.
    async fn execute(&self, input: Value, ctx: &ToolContext, cancel: CancellationToken) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_is_clamped_to_the_valid_range() {
        let a = Annotations::new("filesystem", 9);
        assert_eq!(a.risk_level, MAX_RISK_LEVEL);
    }
}
