//! Type-erased actor handles and the per-actor [`Context`] passed to
//! `recv`.
//!
//! Every actor's user-message channel is generic over its own message
//! type, but parents need to hold children of heterogeneous message
//! types in one list, and the system messages (`Stop`, `Watch`,
//! `Terminated`, ...) never depend on it either. [`CellControl`] is the
//! type-erased face actors present to the rest of the runtime; `ActorRef`
//! is the typed face applications use to `tell` it messages.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::dead_letter::DeadLetterSink;
use super::message::{Envelope, SystemMsg};
use super::pid::Pid;
use super::queue::{self, PushError};
use super::supervisor::Strategy;
use super::system::ActorSystem;
use crate::config::OverflowPolicy;
use crate::error::{CoreError, Result};

/// Phase of one actor cell's run loop, observable from outside for
/// diagnostics and tests. Transitions: `Starting` -> `Running` ->
/// (`Restarting` -> `Running`)* -> `Stopping` -> `Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Starting = 0,
    Running = 1,
    Restarting = 2,
    Stopping = 3,
    Stopped = 4,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Starting,
            1 => LifecycleState::Running,
            2 => LifecycleState::Restarting,
            3 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

/// Type-erased control surface of one actor cell: enough to stop it, watch
/// it, or hand it a system message, without knowing its user message type.
pub trait CellControl: Send + Sync + std::fmt::Debug {
    fn pid(&self) -> &Pid;
    fn tell_system(&self, msg: SystemMsg);
    fn lifecycle_state(&self) -> LifecycleState;
    /// The spawn-site restart policy override set via `Props::with_strategy`,
    /// if any. A parent's failure handler prefers this over its own
    /// `Actor::supervisor_strategy()` when deciding a child's directive.
    fn supervisor_override(&self) -> Option<Strategy>;
}

pub type AnyRef = Arc<dyn CellControl>;

pub(crate) struct TypedCellHandle<M> {
    pub(crate) pid: Pid,
    pub(crate) sys_tx: mpsc::Sender<SystemMsg>,
    pub(crate) state: Arc<AtomicU8>,
    pub(crate) strategy: Option<Strategy>,
    _marker: std::marker::PhantomData<fn() -> M>,
}

impl<M> std::fmt::Debug for TypedCellHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCellHandle")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl<M> TypedCellHandle<M> {
    pub(crate) fn new(
        pid: Pid,
        sys_tx: mpsc::Sender<SystemMsg>,
        state: Arc<AtomicU8>,
        strategy: Option<Strategy>,
    ) -> Arc<Self> {
        Arc::new(TypedCellHandle {
            pid,
            sys_tx,
            state,
            strategy,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<M: Send + 'static> CellControl for TypedCellHandle<M> {
    fn pid(&self) -> &Pid {
        &self.pid
    }

    fn tell_system(&self, msg: SystemMsg) {
        let _ = self.sys_tx.try_send(msg);
    }

    fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn supervisor_override(&self) -> Option<Strategy> {
        self.strategy.clone()
    }
}

/// A typed, cloneable reference to a live (or recently-live) actor.
pub struct ActorRef<M> {
    pid: Pid,
    mailbox_tx: queue::MailboxTx<Envelope<M>>,
    handle: AnyRef,
    dead_letters: DeadLetterSink,
    overflow: OverflowPolicy,
    send_timeout: std::time::Duration,
}

impl<M> Clone for ActorRef<M> {
    fn clone(&self) -> Self {
        ActorRef {
            pid: self.pid.clone(),
            mailbox_tx: self.mailbox_tx.clone(),
            handle: self.handle.clone(),
            dead_letters: self.dead_letters.clone(),
            overflow: self.overflow,
            send_timeout: self.send_timeout,
        }
    }
}

impl<M: Send + 'static> ActorRef<M> {
    pub(crate) fn new(
        pid: Pid,
        mailbox_tx: queue::MailboxTx<Envelope<M>>,
        handle: AnyRef,
        dead_letters: DeadLetterSink,
        overflow: OverflowPolicy,
        send_timeout: std::time::Duration,
    ) -> Self {
        ActorRef {
            pid,
            mailbox_tx,
            handle,
            dead_letters,
            overflow,
            send_timeout,
        }
    }

    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    pub fn as_any(&self) -> AnyRef {
        self.handle.clone()
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.handle.lifecycle_state()
    }

    /// Send applying the configured overflow policy (see
    /// [`crate::config::OverflowPolicy`]): waits up to a timeout under
    /// the default policy, drops a message under `DropNewest`/`DropOldest`
    /// (publishing a dead letter for the drop), or fails immediately
    /// under `Fail`. Use [`ActorRef::try_tell`] for an always-immediate
    /// send regardless of the configured policy.
    pub async fn tell(&self, msg: M, sender: Option<Pid>) -> Result<()> {
        let envelope = Envelope { msg, sender };
        match self.overflow {
            OverflowPolicy::Fail => self.mailbox_tx.try_push(envelope).map_err(|e| self.on_push_err(e)),
            OverflowPolicy::DropNewest => match self.mailbox_tx.try_push(envelope) {
                Ok(()) => Ok(()),
                Err(PushError::Full(_dropped)) => {
                    self.dead_letters.publish(self.pid.to_string(), "mailbox full, dropped newest message");
                    Ok(())
                }
                Err(closed @ PushError::Closed(_)) => Err(self.on_push_err(closed)),
            },
            OverflowPolicy::DropOldest => match self.mailbox_tx.push_evicting_oldest(envelope) {
                Ok(Some(_evicted)) => {
                    self.dead_letters.publish(self.pid.to_string(), "mailbox full, dropped oldest message");
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(_) => {
                    self.dead_letters.publish(self.pid.to_string(), "target actor stopped");
                    Err(CoreError::ActorNotFound(self.pid.to_string()))
                }
            },
            OverflowPolicy::BlockWithTimeout => {
                match tokio::time::timeout(self.send_timeout, self.mailbox_tx.push(envelope)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => {
                        self.dead_letters.publish(self.pid.to_string(), "target actor stopped");
                        Err(CoreError::ActorNotFound(self.pid.to_string()))
                    }
                    Err(_elapsed) => {
                        self.dead_letters.publish(self.pid.to_string(), "mailbox full, send timed out");
                        Err(CoreError::MailboxFull(self.pid.to_string()))
                    }
                }
            }
        }
    }

    fn on_push_err(&self, err: PushError<Envelope<M>>) -> CoreError {
        match err {
            PushError::Full(_) => {
                self.dead_letters.publish(self.pid.to_string(), "mailbox full");
                CoreError::MailboxFull(self.pid.to_string())
            }
            PushError::Closed(_) => {
                self.dead_letters.publish(self.pid.to_string(), "target actor stopped");
                CoreError::ActorNotFound(self.pid.to_string())
            }
        }
    }

    /// Non-blocking send; returns `MailboxFull` immediately instead of
    /// waiting for room, regardless of the configured overflow policy.
    pub fn try_tell(&self, msg: M, sender: Option<Pid>) -> Result<()> {
        self.mailbox_tx
            .try_push(Envelope { msg, sender })
            .map_err(|e| self.on_push_err(e))
    }

    pub fn stop(&self) {
        self.handle.tell_system(SystemMsg::PoisonPill);
    }

    pub fn watch(&self, watcher: AnyRef) {
        self.handle
            .tell_system(SystemMsg::Watch(watcher.pid().clone(), watcher));
    }

    pub fn unwatch(&self, watcher_pid: Pid) {
        self.handle.tell_system(SystemMsg::Unwatch(watcher_pid));
    }
}

/// Passed to every `Actor::recv`/lifecycle hook; the actor's window into
/// the rest of the runtime.
pub struct Context<M> {
    pub myself: ActorRef<M>,
    pub parent: Option<AnyRef>,
    pub system: ActorSystem,
    pub(crate) children: Arc<std::sync::Mutex<Vec<AnyRef>>>,
}

impl<M: Send + 'static> Context<M> {
    pub fn stop_child(&self, child: &AnyRef) {
        child.tell_system(SystemMsg::PoisonPill);
    }

    pub fn watch(&self, target: &AnyRef) {
        target.tell_system(SystemMsg::Watch(self.myself.pid().clone(), self.myself.as_any()));
    }

    pub fn unwatch(&self, target: &AnyRef) {
        target.tell_system(SystemMsg::Unwatch(self.myself.pid().clone()));
    }

    /// Spawns a new actor as a child of this one. The child is stopped
    /// and restarted as part of this actor's own stop/restart cascade.
    pub fn spawn_child<A: super::Actor>(&self, props: super::props::Props<A>) -> Result<ActorRef<A::Msg>> {
        let spawned = self.system.spawn_child(self.myself.pid().path(), self.myself.as_any(), props)?;
        self.children.lock().unwrap().push(spawned.any_ref.clone());
        Ok(spawned.actor_ref)
    }

    /// Current children of this actor, most recently spawned last.
    pub fn children(&self) -> Vec<AnyRef> {
        self.children.lock().unwrap().clone()
    }
}
