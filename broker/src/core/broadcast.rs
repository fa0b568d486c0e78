//! Fan-out of broker entity updates to stream subscribers
//!
//! Every subscriber owns an unbounded queue. The broadcaster keeps only the
//! sending halves; dropping an [`EntitySubscription`] removes its sender from
//! the list, so an abruptly disconnected consumer is always deregistered.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::entities::BrokerEntityUpdate;

type Sender = mpsc::UnboundedSender<BrokerEntityUpdate>;

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    senders: Mutex<Vec<(u64, Sender)>>,
}

impl Subscribers {
    fn remove(&self, id: u64) {
        self.senders.lock().retain(|(sid, _)| *sid != id);
    }
}

/// Registry of live subscriber queues
#[derive(Clone, Default)]
pub struct Broadcaster {
    inner: Arc<Subscribers>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber whose queue starts with `snapshot`
    pub fn subscribe(&self, snapshot: Vec<BrokerEntityUpdate>) -> EntitySubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        for update in snapshot {
            // The receiver is still in scope
            let _ = tx.send(update);
        }

        let id = self.attach(tx);
        debug!(subscriber = id, "Entity stream subscriber registered");

        EntitySubscription {
            id,
            rx,
            subscribers: Arc::downgrade(&self.inner),
        }
    }

    fn attach(&self, tx: Sender) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.senders.lock().push((id, tx));
        id
    }

    /// Push `updates` to every subscriber
    ///
    /// A failed delivery is logged and skipped; the remaining subscribers
    /// still receive the full batch. Returns how many subscribers were
    /// reached.
    pub fn broadcast(&self, updates: &[BrokerEntityUpdate]) -> usize {
        let mut senders = self.inner.senders.lock();
        let mut delivered = 0;

        senders.retain(|(id, tx)| {
            for update in updates {
                if tx.send(update.clone()).is_err() {
                    warn!(subscriber = *id, "Failed to notify subscriber, dropping it");
                    return false;
                }
            }
            delivered += 1;
            true
        });

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.senders.lock().len()
    }
}

/// Snapshot-then-live stream of broker entity updates
///
/// Implements [`Stream`]; it never ends on its own while the broadcaster is
/// alive.
pub struct EntitySubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<BrokerEntityUpdate>,
    subscribers: Weak<Subscribers>,
}

impl EntitySubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next update
    pub async fn recv(&mut self) -> Option<BrokerEntityUpdate> {
        self.rx.recv().await
    }

    /// Next queued update without waiting
    pub fn try_recv(&mut self) -> Option<BrokerEntityUpdate> {
        self.rx.try_recv().ok()
    }

    /// Drain every queued update without waiting
    pub fn drain(&mut self) -> Vec<BrokerEntityUpdate> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Stream for EntitySubscription {
    type Item = BrokerEntityUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for EntitySubscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(self.id);
            debug!(subscriber = self.id, "Entity stream subscriber removed");
        }
    }
}
