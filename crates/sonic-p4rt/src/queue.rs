//! Outbound request queue feeding the StreamChannel RPC.
//!
//! Producers call [`OutboundQueue::put`]; the streaming call consumes the
//! queue through [`OutboundQueue::take_stream`]. Closing enqueues an
//! end-of-stream marker, which terminates the outbound half of the RPC after
//! every message enqueued before it has been delivered.
//!
//! The queue has exactly one consumer. `take_stream` hands out the receiving
//! side once and returns `None` afterwards.

use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{P4rtError, P4rtResult};

/// A queued item: an application message or the end-of-stream marker.
#[derive(Debug)]
enum Slot<T> {
    Message(T),
    EndOfStream,
}

/// Unbounded FIFO queue with a single sentinel-based close.
#[derive(Debug)]
pub struct OutboundQueue<T> {
    /// `None` once the queue has been closed.
    tx: Mutex<Option<mpsc::UnboundedSender<Slot<T>>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Slot<T>>>>,
}

impl<T: Send + 'static> OutboundQueue<T> {
    /// Creates an empty, open queue.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Appends a message. Never blocks.
    ///
    /// Fails with [`P4rtError::QueueClosed`] after [`close`](Self::close), or
    /// once the consumer side has been dropped.
    pub fn put(&self, message: T) -> P4rtResult<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(P4rtError::QueueClosed)?;
        tx.send(Slot::Message(message))
            .map_err(|_| P4rtError::QueueClosed)
    }

    /// Enqueues the end-of-stream marker. Subsequent calls are no-ops.
    ///
    /// Returns `true` if this call closed the queue.
    pub fn close(&self) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // The consumer may already be gone; the queue is closed either way.
                let _ = tx.send(Slot::EndOfStream);
                true
            }
            None => false,
        }
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Takes the consuming view of the queue.
    ///
    /// The stream yields messages in enqueue order and ends at the
    /// end-of-stream marker, after which it keeps returning `None`. Only the
    /// first call returns a stream.
    pub fn take_stream(&self) -> Option<BoxStream<'static, T>> {
        let rx = self.rx.lock().take()?;
        let stream = stream::unfold(rx, |mut rx| async move {
            match rx.recv().await {
                Some(Slot::Message(message)) => Some((message, rx)),
                Some(Slot::EndOfStream) | None => None,
            }
        });
        Some(stream.fuse().boxed())
    }
}

impl<T: Send + 'static> Default for OutboundQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
