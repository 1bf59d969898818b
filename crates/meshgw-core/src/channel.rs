//! Unbounded hand-off queues between tasks
//!
//! A channel has one producing stage and any number of consuming workers.
//! Items leave in the order they were sent, but when several workers share
//! a receiver the order in which they *finish* processing is not defined.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::error::ChannelClosed;

/// Create a new unbounded channel
pub fn channel<T>() -> (ChannelSender<T>, ChannelReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ChannelSender { tx },
        ChannelReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producing end of a channel
pub struct ChannelSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> ChannelSender<T> {
    /// Enqueue an item. Never blocks; fails only once every receiver is gone.
    pub fn send(&self, item: T) -> Result<(), ChannelClosed> {
        self.tx.send(item).map_err(|_| ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> Clone for ChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> fmt::Debug for ChannelSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSender")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Consuming end of a channel, shareable between workers
pub struct ChannelReceiver<T> {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<T>>>,
}

impl<T> ChannelReceiver<T> {
    /// Wait for the next item
    ///
    /// Blocks for as long as the channel is empty. Returns `None` once every
    /// sender has been dropped and the queue is drained.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Take the next item if one is queued and no other worker is waiting
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Take every item queued right now
    pub fn drain(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.try_recv() {
            items.push(item);
        }
        items
    }
}

impl<T> Clone for ChannelReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> fmt::Debug for ChannelReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReceiver")
            .field("workers", &Arc::strong_count(&self.rx))
            .finish()
    }
}
