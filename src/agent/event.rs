//! `AgentEvent`: the unit every leaf agent and workflow composite emits.
//! Field names follow common agent-event observability conventions
//! (`agent_id`, `agent_name`-style provenance, a free-form `metadata` map
//! for composition bookkeeping).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::bus::EventPayload;

/// Side-channel actions a consumer should take in response to this
/// event, independent of its content (e.g. surface it to a human for
/// intervention).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EventActions {
    pub escalate: bool,
}

/// One emission on an agent's (or composite's) output stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentEvent {
    pub id: Uuid,
    pub timestamp_secs: u64,
    pub agent_id: String,
    pub author: String,
    pub content: EventPayload,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// Path of composite agents that produced this event, e.g.
    /// `Root.Parallel.Child.iter2`.
    pub branch: String,
    #[serde(default)]
    pub actions: EventActions,
}

impl AgentEvent {
    pub fn new(agent_id: impl Into<String>, author: impl Into<String>, branch: impl Into<String>, content: EventPayload) -> Self {
        AgentEvent {
            id: Uuid::new_v4(),
            timestamp_secs: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            agent_id: agent_id.into(),
            author: author.into(),
            content,
            metadata: HashMap::new(),
            branch: branch.into(),
            actions: EventActions::default(),
        }
    }

    /// Returns a copy with `key` set in `metadata`, used heavily by the
    /// workflow composer to stamp `sequential_step`, `parallel_index`,
    /// `loop_iteration`, and similar provenance fields as an event is
    /// forwarded up through nested composites.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }
}
