//! Queue between the transport callback and the consumer thread.
//!
//! The transport only enqueues; everything else happens on the consumer. The
//! default queue is unbounded so a slow consumer never stalls the network
//! client. With a bounded queue `enqueue` blocks when full, but the transport
//! callback never does: a frame that does not fit is dropped and counted.

use crate::error::{LipstreamError, Result};
use crate::transport::MessageHandler;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Producer side of an ingest queue.
#[derive(Debug)]
pub struct IngestSender<T> {
    tx: Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for IngestSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

/// Create an ingest queue, unbounded unless `capacity` is given.
pub fn ingest_queue<T>(capacity: Option<usize>) -> (IngestSender<T>, Receiver<T>) {
    let (tx, rx) = match capacity {
        Some(capacity) => bounded(capacity),
        None => unbounded(),
    };
    (
        IngestSender {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl<T> IngestSender<T> {
    /// Append one item. Fails only once the consumer is gone.
    pub fn enqueue(&self, item: T) -> Result<()> {
        self.tx.send(item).map_err(|_| LipstreamError::Transport {
            message: "ingest queue closed".to_string(),
        })
    }

    /// Append one item without waiting. A full queue hands the item back.
    pub fn try_enqueue(&self, item: T) -> std::result::Result<(), TrySendError<T>> {
        self.tx.try_send(item)
    }

    /// Items waiting to be consumed.
    pub fn depth(&self) -> usize {
        self.tx.len()
    }

    /// Messages the transport callback dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// Runs on the network event loop, so it must never wait for the consumer.
impl MessageHandler for IngestSender<Vec<u8>> {
    fn on_message(&self, payload: Vec<u8>) {
        match self.try_enqueue(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(payload)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "ingest queue full, dropping {} byte message ({} dropped so far)",
                    payload.len(),
                    dropped
                );
            }
            Err(TrySendError::Disconnected(payload)) => {
                warn!("dropping {} byte message: ingest queue closed", payload.len());
            }
        }
    }
}
