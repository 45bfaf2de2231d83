//! Spawn-time configuration: a `Props`/actor-producer pair, using a plain
//! `Fn` factory instead of a boxed, mutex-guarded producer trait object.

use std::sync::Arc;

use crate::actor::supervisor::Strategy;
use crate::actor::Actor;

/// A factory that produces a fresh instance of an actor's behavior. Stored
/// so a restart can rebuild state from scratch.
pub type Producer<A> = Arc<dyn Fn() -> A + Send + Sync>;

/// Spawn-time configuration for one actor: name, mailbox capacity, and an
/// optional per-spawn-site supervisor strategy override. When `strategy`
/// is `None`, the *parent's* `Actor::supervisor_strategy()` decides this
/// child's failures, same as before `with_strategy` existed; setting it
/// lets one spawn call override that default without touching the
/// parent's behavior for its other children.
#[derive(Clone)]
pub struct Props<A: Actor> {
    pub name: String,
    pub mailbox_capacity: usize,
    pub reset_mailbox_on_restart: bool,
    pub strategy: Option<Strategy>,
    pub(crate) producer: Producer<A>,
}

impl<A: Actor> Props<A> {
    pub fn new(name: impl Into<String>, producer: impl Fn() -> A + Send + Sync + 'static) -> Self {
        Props {
            name: name.into(),
            mailbox_capacity: 1024,
            reset_mailbox_on_restart: false,
            strategy: None,
            producer: Arc::new(producer),
        }
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_reset_mailbox(mut self, reset: bool) -> Self {
        self.reset_mailbox_on_restart = reset;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }
}
