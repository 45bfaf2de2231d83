//! Subscriptions: a channel-typed, optionally filtered view over the
//! bus, delivered through a bounded out-channel that never blocks a
//! producer — a full subscriber buffer drops the envelope for that
//! subscriber only, tracked by a per-subscription counter.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::envelope::{Channel, Envelope};

pub type Filter = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

pub struct Subscription {
    pub(crate) id: u64,
    channels: HashSet<Channel>,
    filter: Option<Filter>,
    tx: mpsc::Sender<Envelope>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        channels: HashSet<Channel>,
        filter: Option<Filter>,
        tx: mpsc::Sender<Envelope>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Subscription {
            id,
            channels,
            filter,
            tx,
            dropped,
        }
    }

    pub(crate) fn matches(&self, envelope: &Envelope) -> bool {
        self.channels.contains(&envelope.channel)
            && self.filter.as_ref().map(|f| f(envelope)).unwrap_or(true)
    }

    /// Non-blocking delivery; a full buffer increments the drop counter
    /// instead of stalling the emitter.
    pub(crate) fn try_deliver(&self, envelope: Envelope) {
        if self.tx.try_send(envelope).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A subscriber's read handle: the receiving half plus its drop counter.
pub struct SubscriptionHandle {
    pub id: u64,
    pub rx: mpsc::Receiver<Envelope>,
    dropped: Arc<AtomicU64>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, rx: mpsc::Receiver<Envelope>, dropped: Arc<AtomicU64>) -> Self {
        SubscriptionHandle { id, rx, dropped }
    }

    /// Count of envelopes dropped for this subscriber because its buffer
    /// was full at delivery time.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}
