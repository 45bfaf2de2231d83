//! The `Actor` trait
//! (`pre_start`/`post_start`/`post_stop`/`supervisor_strategy`/`recv`),
//! with `sys_recv` dropped in favor of dedicated lifecycle hooks, since
//! this runtime exposes `Restarting`/`Stopping` as explicit hook calls
//! rather than a generic system-event match arm.

use async_trait::async_trait;

use super::cell::Context;
use super::pid::Pid;
use super::supervisor::Strategy;
use crate::error::Result;

/// Behavior run by one actor cell. `Msg` is the type of user message this
/// actor accepts; system messages (start/stop/restart/watch) are handled
/// by the runtime and surfaced through the lifecycle hooks below.
#[async_trait]
pub trait Actor: Send + 'static {
    type Msg: Send + 'static;

    /// Called once before the first message is processed.
    async fn pre_start(&mut self, _ctx: &Context<Self::Msg>) {}

    /// Called once after `pre_start` completes successfully.
    async fn post_start(&mut self, _ctx: &Context<Self::Msg>) {}

    /// Called when a `Restart` directive is about to reset this actor's
    /// state; `pre_start` runs again immediately after.
    async fn pre_restart(&mut self, _ctx: &Context<Self::Msg>) {}

    /// Called once the actor has stopped processing messages for good.
    async fn post_stop(&mut self, _ctx: &Context<Self::Msg>) {}

    /// The strategy used to decide how *this actor's supervisor* treats a
    /// panic raised by this actor. Default: restart, bounded by the
    /// system's default restart budget.
    fn supervisor_strategy(&self) -> Strategy {
        Strategy::default()
    }

    /// Handle one user message. Returning `Err` does not stop the actor by
    /// itself — the runtime only treats a *panic* as a supervised
    /// failure; an `Err` return is ordinary application-level signal the
    /// actor can act on (e.g. logging) and is not escalated.
    async fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Option<Pid>) -> Result<()>;
}
