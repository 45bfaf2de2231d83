//! Workflow composer: higher-order agents that consume one or more
//! sub-agent streams and re-emit enriched events on a single merged
//! stream. Every composite implements the same [`crate::agent::Agent`]
//! contract as a leaf agent, so composites nest without limit.

mod loop_agent;
mod parallel;
mod router;
mod sequential;
mod steps;
mod task_manager;

pub use loop_agent::LoopAgent;
pub use parallel::Parallel;
pub use router::{Router, RouterMode};
pub use sequential::Sequential;
pub use steps::{Step, StepFn, StepsGroup};
pub use task_manager::{TaskManager, TaskSnapshot, TaskStatus};

/// Tags a composite's shape in the workflow tree without downcasting.
/// Every composite in this module overrides `Agent::kind()` with its own
/// variant.
pub use crate::agent::NodeKind as Node;

use serde_json::Value;

use crate::agent::AgentEvent;
use crate::bus::EventPayload;
use crate::error::{CoreError, Result};
use crate::stream::{Reader, Writer};

/// Stamps and forwards every event from `reader` into `writer` until
/// end-of-stream or a terminal error. Returns `Ok(())` on a clean
/// end-of-stream, `Err(Cancelled)` if the downstream reader cancelled,
/// or the terminal error the upstream writer sent.
pub(crate) async fn forward_all<F>(
    reader: &mut Reader<AgentEvent>,
    writer: &mut Writer<AgentEvent>,
    mut stamp: F,
) -> Result<()>
where
    F: FnMut(AgentEvent) -> AgentEvent,
{
    loop {
        match reader.recv().await {
            Ok(event) => {
                let event = stamp(event);
                if writer.send(event).await {
                    return Err(CoreError::Cancelled);
                }
            }
            Err(e) if e.is_end_of_stream() => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// A lifecycle (non-content) event emitted by a composite around its own
/// boundaries: `WorkflowStarted`, `StepStarted`, `StepProgress`,
/// `StepCompleted`, `WorkflowCompleted`. Carried as `EventPayload::Custom`
/// since these are not part of the stable external wire payload shapes.
pub(crate) fn lifecycle_event(agent_id: &str, author: &str, branch: &str, kind: &str, body: Value) -> AgentEvent {
    let mut payload = serde_json::json!({ "lifecycle": kind });
    if let Value::Object(map) = body {
        if let Value::Object(ref mut target) = payload {
            target.extend(map);
        }
    }
    AgentEvent::new(agent_id, author, branch, EventPayload::Custom(payload))
}
