//! The back-pressured stream primitive: a bounded, single-producer
//! single-consumer pipe carrying either values or a terminal error,
//! closed exactly once by its producer.
//!
//! Built on `tokio::sync::mpsc`, the same bounded-channel foundation the
//! mailbox queue uses, but specialized to the value/error/end-of-stream
//! shape the workflow and event layers need rather than a raw message
//! queue.

use tokio::sync::mpsc;

use crate::error::CoreError;

enum Item<T> {
    Value(T),
    Err(CoreError),
}

/// Creates a bounded pipe. `capacity` of `0` behaves as a synchronous
/// rendezvous (the writer's send resolves only once a reader has taken
/// the value).
pub fn pipe<T: Send + 'static>(capacity: usize) -> (Writer<T>, Reader<T>) {
    let cap = capacity.max(1);
    let (tx, rx) = mpsc::channel(cap);
    let cancelled = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    (
        Writer {
            tx,
            cancelled: cancelled.clone(),
            closed: false,
        },
        Reader { rx, cancelled },
    )
}

pub struct Writer<T> {
    tx: mpsc::Sender<Item<T>>,
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
    closed: bool,
}

pub struct Reader<T> {
    rx: mpsc::Receiver<Item<T>>,
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl<T: Send + 'static> Writer<T> {
    /// Sends one value. Returns `true` if the reader has cancelled and
    /// the value was not actually delivered — callers should stop
    /// producing once this returns `true`.
    pub async fn send(&mut self, value: T) -> bool {
        if self.cancelled.load(std::sync::atomic::Ordering::Acquire) {
            return true;
        }
        self.tx.send(Item::Value(value)).await.is_err()
    }

    /// Sends a terminal error; no further values should be sent
    /// afterward. Consumes the writer since exactly one terminal send is
    /// meaningful.
    pub async fn fail(mut self, err: CoreError) {
        let _ = self.tx.send(Item::Err(err)).await;
        self.closed = true;
    }

    /// Closes the stream, signalling end-of-stream to the reader. Safe to
    /// call even if `fail` was never reached; a `Writer` dropped without
    /// an explicit close also closes the channel, but `close` makes the
    /// intent explicit.
    pub fn close(mut self) {
        self.closed = true;
        // Dropping `self.tx` (via `self` going out of scope) closes the
        // channel; the receiver observes `EndOfStream` on the next recv.
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::Acquire)
    }
}

impl<T: Send + 'static> Reader<T> {
    /// Receives the next value. `Err(CoreError::EndOfStream)` signals
    /// normal completion; any other error is the terminal error sent by
    /// the writer.
    pub async fn recv(&mut self) -> Result<T, CoreError> {
        match self.rx.recv().await {
            Some(Item::Value(v)) => Ok(v),
            Some(Item::Err(e)) => Err(e),
            None => Err(CoreError::EndOfStream),
        }
    }

    /// Signals upstream that no further values are wanted; subsequent
    /// `Writer::send` calls return `true` without delivering.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::Release);
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_values_in_order() {
        let (mut w, mut r) = pipe::<i32>(4);
        tokio::spawn(async move {
            for i in 0..5 {
                w.send(i).await;
            }
            w.close();
        });
        let mut seen = Vec::new();
        loop {
            match r.recv().await {
                Ok(v) => seen.push(v),
                Err(e) if e.is_end_of_stream() => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn terminal_error_surfaces_once() {
        let (w, mut r) = pipe::<i32>(4);
        w.fail(CoreError::ProviderError("boom".into())).await;
        let err = r.recv().await.unwrap_err();
        assert!(matches!(err, CoreError::ProviderError(_)));
    }

    #[tokio::test]
    async fn cancel_stops_further_sends() {
        let (mut w, mut r) = pipe::<i32>(1);
        r.cancel();
        let cancelled = w.send(1).await;
        assert!(cancelled);
    }
}
