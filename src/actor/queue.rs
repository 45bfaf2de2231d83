//! A bounded, single-consumer mailbox queue that the sender itself can
//! inspect and evict from. `tokio::sync::mpsc` only gives two of the
//! required overflow behaviors for free (block on a full channel, or
//! fail immediately via `try_send`); drop-newest and drop-oldest both
//! need the sender to see, and sometimes discard from, the queue itself,
//! which an `mpsc::Sender` cannot do.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    closed: AtomicBool,
    item_ready: Notify,
    space_freed: Notify,
}

pub(crate) struct MailboxTx<T> {
    shared: Arc<Shared<T>>,
}

pub(crate) struct MailboxRx<T> {
    shared: Arc<Shared<T>>,
}

/// Outcome of a non-blocking push attempt.
pub(crate) enum PushError<T> {
    /// The queue was at capacity; the value was not enqueued.
    Full(T),
    /// The receiver has been dropped; the value was not enqueued.
    Closed(T),
}

pub(crate) fn channel<T>(capacity: usize) -> (MailboxTx<T>, MailboxRx<T>) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        capacity: capacity.max(1),
        closed: AtomicBool::new(false),
        item_ready: Notify::new(),
        space_freed: Notify::new(),
    });
    (MailboxTx { shared: shared.clone() }, MailboxRx { shared })
}

impl<T> Clone for MailboxTx<T> {
    fn clone(&self) -> Self {
        MailboxTx { shared: self.shared.clone() }
    }
}

impl<T> MailboxTx<T> {
    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Enqueues without waiting.
    pub(crate) fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        if self.is_closed() {
            return Err(PushError::Closed(value));
        }
        let mut queue = self.shared.queue.lock().unwrap();
        if queue.len() >= self.shared.capacity {
            return Err(PushError::Full(value));
        }
        queue.push_back(value);
        drop(queue);
        self.shared.item_ready.notify_one();
        Ok(())
    }

    /// Enqueues unconditionally, evicting the oldest queued value first
    /// if the queue is already at capacity. Returns the evicted value,
    /// if any, or `Err(value)` if the receiver is gone.
    pub(crate) fn push_evicting_oldest(&self, value: T) -> Result<Option<T>, T> {
        if self.is_closed() {
            return Err(value);
        }
        let mut queue = self.shared.queue.lock().unwrap();
        let evicted = if queue.len() >= self.shared.capacity {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(value);
        drop(queue);
        self.shared.item_ready.notify_one();
        Ok(evicted)
    }

    /// Waits for room and enqueues, or returns the value back if the
    /// receiver is dropped while waiting.
    pub(crate) async fn push(&self, mut value: T) -> Result<(), T> {
        loop {
            match self.try_push(value) {
                Ok(()) => return Ok(()),
                Err(PushError::Closed(back)) => return Err(back),
                Err(PushError::Full(back)) => {
                    value = back;
                    self.shared.space_freed.notified().await;
                }
            }
        }
    }
}

impl<T> MailboxRx<T> {
    pub(crate) async fn recv(&mut self) -> Option<T> {
        loop {
            {
                let mut queue = self.shared.queue.lock().unwrap();
                if let Some(value) = queue.pop_front() {
                    drop(queue);
                    self.shared.space_freed.notify_one();
                    return Some(value);
                }
                if self.shared.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.shared.item_ready.notified().await;
        }
    }

    /// Drops one queued value without waiting, if any. Used to discard a
    /// restarting actor's backlog.
    pub(crate) fn try_recv(&mut self) -> Option<T> {
        let mut queue = self.shared.queue.lock().unwrap();
        let value = queue.pop_front();
        drop(queue);
        if value.is_some() {
            self.shared.space_freed.notify_one();
        }
        value
    }
}

impl<T> Drop for MailboxRx<T> {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.item_ready.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_then_recv_preserves_order() {
        let (tx, mut rx) = channel::<u32>(4);
        tx.try_push(1).ok();
        tx.try_push(2).ok();
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
    }

    #[test]
    fn try_push_fails_full() {
        let (tx, _rx) = channel::<u32>(1);
        tx.try_push(1).ok();
        assert!(matches!(tx.try_push(2), Err(PushError::Full(2))));
    }

    #[test]
    fn push_evicting_oldest_reports_the_evicted_value() {
        let (tx, _rx) = channel::<u32>(2);
        tx.try_push(1).ok();
        tx.try_push(2).ok();
        let evicted = tx.push_evicting_oldest(3).unwrap();
        assert_eq!(evicted, Some(1));
    }

    #[tokio::test]
    async fn recv_returns_none_once_sender_channel_is_closed() {
        let (tx, mut rx) = channel::<u32>(2);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
