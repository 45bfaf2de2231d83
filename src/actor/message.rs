//! System-level control messages and the envelope wrapping user messages.
//!
//! User messages travel on a per-actor-typed channel; system messages
//! travel on a second, type-erased channel so the dispatch loop can give
//! them priority without needing to know the actor's message type. This
//! is the usual dual `queue`/`sys_queue` mailbox split.

use super::pid::Pid;
use crate::error::CoreError;

/// Reserved lifecycle and supervision messages. Reserved `kind` strings:
/// `started`, `stopping`, `stopped`, `restarting`, `poison_pill`, `watch`,
/// `unwatch`, `terminated`, `failed`.
#[derive(Clone, Debug)]
pub enum SystemMsg {
    Started,
    Stopping,
    /// Sent from a child to its parent once it has fully stopped, driving
    /// cascade-stop/cascade-restart completion. Distinct from `Terminated`,
    /// which is sent to application-level watchers (see the ownership vs.
    /// watching split in the design notes).
    Stopped(Pid),
    /// Directive from a parent telling a failed child to reset its state
    /// and continue.
    Restarting,
    /// Directive from a parent telling a failed child to drop the failed
    /// message and keep processing.
    Resume,
    PoisonPill,
    Watch(Pid, super::cell::AnyRef),
    Unwatch(Pid),
    Terminated(Pid),
    /// A child cell reports a panic to its parent for supervision. Never
    /// observed by application code.
    Failed(Pid, CoreError),
}

impl SystemMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            SystemMsg::Started => "started",
            SystemMsg::Stopping => "stopping",
            SystemMsg::Stopped(_) => "stopped",
            SystemMsg::Restarting => "restarting",
            SystemMsg::Resume => "resume",
            SystemMsg::PoisonPill => "poison_pill",
            SystemMsg::Watch(..) => "watch",
            SystemMsg::Unwatch(_) => "unwatch",
            SystemMsg::Terminated(_) => "terminated",
            SystemMsg::Failed(..) => "failed",
        }
    }
}

/// A user message together with the [`Pid`] of its sender, if any.
#[derive(Clone, Debug)]
pub struct Envelope<M> {
    pub msg: M,
    pub sender: Option<Pid>,
}
