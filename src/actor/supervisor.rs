//! Supervisor strategies: the decider that turns a child's panic into a
//! [`Directive`], plus the bounded restart budget that escalates a
//! persistently crashing child rather than restarting it forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::CoreError;

/// What a supervisor does in response to a child's failure. Adds `Resume`
/// alongside the usual restart/stop/escalate set, for failures where the
/// actor's state is still sound and only the in-flight message should be
/// dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Drop the failed message and keep processing the mailbox as-is.
    Resume,
    /// Reset the actor's state (`pre_restart`/`pre_start`) and continue.
    Restart,
    /// Stop the actor and cascade to its children.
    Stop,
    /// Re-raise the failure to the grandparent.
    Escalate,
}

pub type Decider = Arc<dyn Fn(&CoreError) -> Directive + Send + Sync>;

/// A one-for-one supervisor: each child's failure is decided independently
/// of its siblings.
#[derive(Clone)]
pub struct Strategy {
    decider: Decider,
    pub max_restarts: u32,
    pub window: Duration,
}

impl Strategy {
    pub fn new(decider: Decider, max_restarts: u32, window: Duration) -> Self {
        Strategy {
            decider,
            max_restarts,
            window,
        }
    }

    pub fn decide(&self, err: &CoreError) -> Directive {
        (self.decider)(err)
    }

    /// Default policy: always restart, bounded by `max_restarts` within
    /// `window` before escalating.
    pub fn restarting(max_restarts: u32, window: Duration) -> Self {
        Strategy::new(Arc::new(|_| Directive::Restart), max_restarts, window)
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::restarting(5, Duration::from_secs(60))
    }
}

impl std::fmt::Debug for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("max_restarts", &self.max_restarts)
            .field("window", &self.window)
            .finish()
    }
}

/// Tracks restart timestamps for one cell and decides when the budget in
/// a [`Strategy`] has been exhausted.
#[derive(Default)]
pub struct RestartBudget {
    restarts: Vec<Instant>,
}

impl RestartBudget {
    pub fn record_and_check(&mut self, strategy: &Strategy) -> bool {
        let now = Instant::now();
        self.restarts.retain(|t| now.duration_since(*t) <= strategy.window);
        self.restarts.push(now);
        self.restarts.len() as u32 <= strategy.max_restarts
    }
}
