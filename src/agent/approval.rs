//! The Approval capability: an external collaborator consulted when the
//! permission policy requires a human or policy-engine decision.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[derive(Clone, Debug)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub masked_args: Option<Value>,
}

#[async_trait]
pub trait Approval: Send + Sync {
    async fn request(&self, tool_name: &str, args: &Value, reason: &str) -> Result<ApprovalDecision>;
}
