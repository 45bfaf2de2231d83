//! Scheduled messages (`schedule`/`schedule_once`/`cancel_schedule`),
//! built directly on a `tokio::time::sleep`/`interval` task instead of a
//! dedicated scheduler actor, since `tokio` already gives every task its
//! own timer wheel entry.

use std::time::Duration;

use tokio::task::JoinHandle;

use super::cell::ActorRef;

/// A handle to a scheduled send; dropping it does not cancel the
/// schedule, call [`ScheduledHandle::cancel`] explicitly.
pub struct ScheduledHandle {
    task: JoinHandle<()>,
}

impl ScheduledHandle {
    pub fn cancel(self) {
        self.task.abort();
    }
}

/// Sends `msg` to `target` once, after `delay`.
pub fn schedule_once<M>(delay: Duration, target: ActorRef<M>, msg: M) -> ScheduledHandle
where
    M: Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = target.tell(msg, None).await;
    });
    ScheduledHandle { task }
}

/// Sends a freshly-built message to `target` every `interval`, starting
/// after the first `interval` elapses.
pub fn schedule_repeat<M>(
    interval: Duration,
    target: ActorRef<M>,
    mut make_msg: impl FnMut() -> M + Send + 'static,
) -> ScheduledHandle
where
    M: Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if target.tell(make_msg(), None).await.is_err() {
                break;
            }
        }
    });
    ScheduledHandle { task }
}
