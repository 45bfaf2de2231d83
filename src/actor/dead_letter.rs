//! A well-known channel for messages the runtime could not deliver.
//! Rather than a send to a stopped actor (or a full strict mailbox)
//! silently vanishing, the runtime republishes it here for anyone
//! watching.

use tokio::sync::broadcast;

/// One message that could not be delivered to its intended recipient.
#[derive(Clone, Debug)]
pub struct DeadLetter {
    pub recipient: String,
    pub reason: String,
}

const CAPACITY: usize = 1024;

/// Cheaply-cloneable publish side, handed to every `ActorRef` so a failed
/// `tell`/`try_tell` can report the loss without needing a round-trip
/// through the actor system.
#[derive(Clone)]
pub(crate) struct DeadLetterSink {
    tx: broadcast::Sender<DeadLetter>,
}

impl DeadLetterSink {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        DeadLetterSink { tx }
    }

    /// Best-effort publish: if nobody is subscribed, the letter is
    /// dropped, same as every other broadcast topic with no listeners.
    pub(crate) fn publish(&self, recipient: impl Into<String>, reason: impl Into<String>) {
        let _ = self.tx.send(DeadLetter {
            recipient: recipient.into(),
            reason: reason.into(),
        });
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DeadLetter> {
        self.tx.subscribe()
    }
}
