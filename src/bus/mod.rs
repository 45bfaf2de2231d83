//! Process-wide, bounded, replayable event timeline with channel-typed
//! fan-out. Built around a pub-sub actor pattern (topic filtering,
//! dead-letter-style isolation of slow subscribers) but reworked around
//! a plain `Mutex<Timeline>` plus non-blocking per subscriber channels
//! instead of an actor mailbox, since the bus itself is a
//! synchronous-feeling, very hot path that every `Emit` goes
//! through.

mod envelope;
mod subscription;
mod timeline;

pub use envelope::{Bookmark, Channel, EventPayload, ToolCaller};
pub use subscription::SubscriptionHandle;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::{debug, warn};
use uuid::Uuid;

use self::subscription::{Filter, Subscription};
use self::timeline::{now_secs, Timeline};
pub use self::envelope::Envelope;

use crate::config::BusConfig;

struct Shared {
    timeline: Mutex<Timeline>,
    cursor: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
    next_sub_id: AtomicU64,
    closing: std::sync::atomic::AtomicBool,
    closed_notify: Notify,
}

/// The event bus. Cloning an `Arc<EventBus>` (as `ActorSystem::bus`
/// does) gives every component the same timeline and subscriber set.
pub struct EventBus {
    shared: Arc<Shared>,
    cleanup: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        let shared = Arc::new(Shared {
            timeline: Mutex::new(Timeline::new(config.max_size, config.max_age())),
            cursor: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
            next_sub_id: AtomicU64::new(1),
            closing: std::sync::atomic::AtomicBool::new(false),
            closed_notify: Notify::new(),
        });

        let cleanup_shared = shared.clone();
        let interval = config.cleanup_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cleanup_shared.timeline.lock().unwrap().evict();
                        if removed > 0 {
                            debug!(removed, "timeline cleanup evicted envelopes");
                        }
                    }
                    _ = cleanup_shared.closed_notify.notified() => break,
                }
            }
        });

        EventBus {
            shared,
            cleanup: std::sync::Mutex::new(Some(handle)),
        }
    }

    /// Assigns the next cursor, appends to the timeline, and fans out to
    /// every matching subscriber via a non-blocking try-send.
    pub fn emit(&self, channel: Channel, event: EventPayload) -> Envelope {
        let cursor = self.shared.cursor.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = Envelope {
            cursor,
            bookmark: Bookmark {
                id: Uuid::new_v4(),
                timestamp_secs: now_secs(),
            },
            channel,
            event,
        };

        self.shared.timeline.lock().unwrap().push(envelope.clone());

        let subs = self.shared.subscriptions.lock().unwrap();
        for sub in subs.iter() {
            if sub.matches(&envelope) {
                sub.try_deliver(envelope.clone());
            }
        }

        envelope
    }

    pub fn subscribe(&self, channels: impl IntoIterator<Item = Channel>, filter: Option<Filter>) -> SubscriptionHandle {
        self.subscribe_buffered(channels, filter, 256)
    }

    pub fn subscribe_buffered(
        &self,
        channels: impl IntoIterator<Item = Channel>,
        filter: Option<Filter>,
        buffer: usize,
    ) -> SubscriptionHandle {
        let id = self.shared.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = tokio::sync::mpsc::channel(buffer.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let channel_set: HashSet<Channel> = channels.into_iter().collect();

        self.shared.subscriptions.lock().unwrap().push(Subscription::new(
            id,
            channel_set,
            filter,
            tx,
            dropped.clone(),
        ));

        SubscriptionHandle::new(id, rx, dropped)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.shared
            .subscriptions
            .lock()
            .unwrap()
            .retain(|s| s.id != handle.id);
    }

    pub fn timeline_range(&self, offset: usize, limit: usize) -> Vec<Envelope> {
        self.shared.timeline.lock().unwrap().range(offset, limit)
    }

    pub fn timeline_since(&self, cursor: u64) -> Vec<Envelope> {
        self.shared.timeline.lock().unwrap().since(cursor)
    }

    pub fn timeline_filtered(&self, predicate: impl Fn(&Envelope) -> bool) -> Vec<Envelope> {
        self.shared.timeline.lock().unwrap().filtered(predicate)
    }

    pub fn timeline_count(&self) -> usize {
        self.shared.timeline.lock().unwrap().len()
    }

    /// Stops the cleanup worker, closes every subscription's out channel,
    /// and clears the timeline. Idempotent.
    pub async fn close(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.closed_notify.notify_waiters();
        if let Some(handle) = self.cleanup.lock().unwrap().take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "bus cleanup task join error");
            }
        }
        self.shared.subscriptions.lock().unwrap().clear();
        self.shared.timeline.lock().unwrap().evict();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;

    fn bus_with(max_size: usize) -> EventBus {
        EventBus::new(BusConfig {
            max_size,
            max_age_secs: 0,
            cleanup_interval_millis: 20,
            subscriber_buffer: 8,
        })
    }

    #[tokio::test]
    async fn cursors_are_strictly_increasing() {
        let bus = bus_with(100);
        let e1 = bus.emit(Channel::Progress, EventPayload::ProgressDone);
        let e2 = bus.emit(Channel::Progress, EventPayload::ProgressDone);
        assert!(e2.cursor > e1.cursor);
        bus.close().await;
    }

    #[tokio::test]
    async fn eviction_respects_max_size() {
        let bus = bus_with(3);
        for _ in 0..10 {
            bus.emit(Channel::Monitor, EventPayload::ProgressDone);
        }
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(bus.timeline_count() <= 3);
        bus.close().await;
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_emit_or_others() {
        let bus = bus_with(1000);
        let mut slow = bus.subscribe_buffered([Channel::Progress], None, 1);
        let mut fast = bus.subscribe_buffered([Channel::Progress], None, 64);

        for _ in 0..20 {
            bus.emit(Channel::Progress, EventPayload::ProgressDone);
        }

        let mut fast_count = 0;
        while fast.rx.try_recv().is_ok() {
            fast_count += 1;
        }
        assert_eq!(fast_count, 20);
        assert!(slow.dropped_count() > 0);
        bus.close().await;
    }

    #[tokio::test]
    async fn subscription_only_sees_matching_channel() {
        let bus = bus_with(1000);
        let mut control_only = bus.subscribe([Channel::Control], None);
        bus.emit(Channel::Progress, EventPayload::ProgressDone);
        bus.emit(
            Channel::Control,
            EventPayload::ControlUiAction {
                surface_id: "s".into(),
                component_id: "c".into(),
                action: "click".into(),
                payload: None,
            },
        );
        let received = control_only.recv().await.unwrap();
        assert_eq!(received.channel, Channel::Control);
        bus.close().await;
    }
}
