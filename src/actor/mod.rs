//! Supervised actor runtime: addressable mailboxes, lifecycle messages,
//! request/response, parent/child ownership, and panic-isolated
//! supervision. See the crate root for how this composes with the
//! stream primitive, event bus and workflow composer.

mod actor;
mod cell;
mod dead_letter;
mod mailbox;
mod message;
mod pid;
mod props;
mod queue;
mod supervisor;
mod system;
mod timer;

pub use actor::Actor;
pub use cell::{ActorRef, AnyRef, CellControl, Context, LifecycleState};
pub use dead_letter::DeadLetter;
pub use message::SystemMsg;
pub use pid::Pid;
pub use props::Props;
pub use supervisor::{Directive, RestartBudget, Strategy};
pub use system::ActorSystem;
pub use timer::{schedule_once, schedule_repeat, ScheduledHandle};

use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{CoreError, Result};

/// Request/response ("ask") helper: builds a message carrying a one-shot
/// reply channel, sends it to `target`, and awaits exactly one reply
/// within `timeout`. Modeled as a free function rather than a method on
/// every message type, since the reply channel is supplied by the
/// caller, not stored on the actor.
pub async fn request<M, R>(
    target: &ActorRef<M>,
    make_msg: impl FnOnce(oneshot::Sender<R>) -> M,
    timeout: Duration,
) -> Result<R>
where
    M: Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let msg = make_msg(tx);
    target.tell(msg, None).await?;

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => Err(CoreError::ActorNotFound(target.pid().to_string())),
        Err(_) => Err(CoreError::ResponseTimeout(timeout)),
    }
}
