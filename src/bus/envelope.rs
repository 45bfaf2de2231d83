//! Envelope, channel and payload shapes recorded on the event bus
//! timeline. Payload variants mirror the stable wire shapes a UI
//! transport observes, following the same `AgentEvent` conventions
//! used throughout the agent and workflow layers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Logical category a subscriber filters on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Progress,
    Control,
    Monitor,
}

/// A caller's identity when a tool-use block originates from a sub-agent
/// rather than the root model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCaller {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool_id: Option<String>,
}

/// Stable event payload shapes observed by transports/UI.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventPayload {
    ProgressTextChunk { step: u64, delta: String },
    ProgressDone,
    ProgressUiSurfaceUpdate {
        surface_id: String,
        components: Vec<Value>,
        root: Option<String>,
        styles: Option<Value>,
    },
    ControlUiAction {
        surface_id: String,
        component_id: String,
        action: String,
        payload: Option<Value>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        caller: Option<ToolCaller>,
    },
    ToolResult {
        id: String,
        output: Option<Value>,
        error: Option<String>,
    },
    /// Workflow/agent lifecycle and arbitrary monitor-channel events that
    /// do not need a dedicated variant; `kind` inside the value still
    /// identifies the concrete shape for observers.
    Custom(Value),
}

/// A bookmark into the timeline: the envelope id plus the wall-clock time
/// it was recorded, usable to resume a subscription after a reconnect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: Uuid,
    pub timestamp_secs: u64,
}

/// One cursor-stamped, immutable record on the bus timeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub cursor: u64,
    pub bookmark: Bookmark,
    pub channel: Channel,
    pub event: EventPayload,
}
