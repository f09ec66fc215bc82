//! Status broadcaster.
//!
//! Holds the single current [`BuildStatus`] and fans status transitions out
//! to every connected status stream. Each subscriber gets its own bounded
//! queue fed with `try_send`, so a slow client loses messages instead of
//! stalling the publisher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, watch};

use super::status::{BuildStatus, RELOAD};

/// Messages buffered per subscriber before new ones are dropped.
const SUBSCRIBER_QUEUE: usize = 16;

struct Subscribers {
    senders: HashMap<u64, mpsc::Sender<String>>,
    closed: bool,
}

/// Publish/subscribe hub for build status.
pub struct StatusBroadcaster {
    current: RwLock<Arc<BuildStatus>>,
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl StatusBroadcaster {
    #[must_use]
    pub fn new(initial: BuildStatus) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            subscribers: RwLock::new(Subscribers {
                senders: HashMap::new(),
                closed: false,
            }),
            next_id: AtomicU64::new(0),
            shutdown: watch::Sender::new(false),
        }
    }

    /// Snapshot of the current status.
    pub fn current(&self) -> Arc<BuildStatus> {
        Arc::clone(&self.current.read().unwrap())
    }

    /// Replace the current status and notify every subscriber.
    pub fn publish(&self, status: BuildStatus) {
        let message = status.to_message();
        *self.current.write().unwrap() = Arc::new(status);
        self.send_all(&message);
    }

    /// Tell every subscriber to reload.
    pub fn reload(&self) {
        self.send_all(RELOAD);
    }

    fn send_all(&self, message: &str) {
        let subscribers = self.subscribers.read().unwrap();
        for (id, sender) in &subscribers.senders {
            if let Err(mpsc::error::TrySendError::Full(_)) = sender.try_send(message.to_owned()) {
                tracing::debug!(subscriber = id, "Subscriber queue full, message dropped");
            }
        }
    }

    /// Open a new status stream. The current status is queued first.
    ///
    /// Returns `None` after [`StatusBroadcaster::shutdown`].
    pub fn subscribe(self: &Arc<Self>) -> Option<Subscription> {
        // The subscriber lock is held across reading the current status so a
        // concurrent publish is either seen here or delivered to the queue.
        let mut subscribers = self.subscribers.write().unwrap();
        if subscribers.closed {
            return None;
        }

        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE);
        let _ = sender.try_send(self.current().to_message());

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        subscribers.senders.insert(id, sender);
        tracing::debug!(subscriber = id, total = subscribers.senders.len(), "Subscriber added");

        Some(Subscription {
            id,
            receiver,
            broadcaster: Arc::clone(self),
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap().senders.len()
    }

    /// Close every subscriber queue and refuse new subscriptions.
    pub fn shutdown(&self) {
        let mut subscribers = self.subscribers.write().unwrap();
        subscribers.closed = true;
        subscribers.senders.clear();
        drop(subscribers);
        self.shutdown.send_replace(true);
        tracing::debug!("Status broadcaster shut down");
    }

    /// Receiver that flips to `true` on shutdown.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.write().unwrap().senders.remove(&id);
    }
}

/// One connection's status queue. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<String>,
    broadcaster: Arc<StatusBroadcaster>,
}

impl Subscription {
    /// Next message, or `None` once the broadcaster shut down.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
