//! `nodecore`: the concurrent execution core of a multi-agent framework —
//! a supervised actor runtime, a back-pressured stream primitive, a
//! bounded event bus, and a workflow composer built from leaf agents.
//!
//! Providers, tools, sandboxes, persistence and transports are external
//! collaborators; this crate only depends on the interfaces described in
//! [`agent::provider`], [`agent::tool`] and [`agent::approval`].

pub mod actor;
pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod stream;
pub mod workflow;

/// Commonly paired imports for crates embedding `nodecore`.
pub mod prelude {
    pub use crate::actor::{request, Actor, ActorRef, ActorSystem, Context, Pid, Props, Strategy};
    pub use crate::agent::{Agent, AgentEvent, AgentInput, ExecContext};
    pub use crate::bus::{Channel, EventBus};
    pub use crate::config::RuntimeConfig;
    pub use crate::error::{CoreError, Result};
    pub use crate::stream::{pipe, Reader, Writer};
}
