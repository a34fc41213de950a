//! Per-key change notification.
//!
//! Publishing only enqueues; a dispatcher task invokes the callbacks, so the
//! mutating caller never waits on subscribers. A panicking callback is caught
//! and logged and does not affect other subscribers. Subscriptions are scoped:
//! dropping the [`Subscription`] handle removes its callback.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// What happened to a key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CacheEvent {
    /// A new value was written.
    Updated(Value),
    /// Removed by delete, capacity pressure or a forced refresh.
    Evicted,
    /// Removed because its TTL elapsed.
    Expired,
}

pub type Callback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    subscribers: RwLock<HashMap<String, HashMap<Uuid, Callback>>>,
}

impl Registry {
    fn insert(&self, key: &str, id: Uuid, callback: Callback) {
        self.subscribers
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(id, callback);
    }

    fn remove(&self, key: &str, id: Uuid) -> bool {
        let mut subscribers = self.subscribers.write();
        let Some(callbacks) = subscribers.get_mut(key) else {
            return false;
        };
        let removed = callbacks.remove(&id).is_some();
        if callbacks.is_empty() {
            subscribers.remove(key);
        }
        removed
    }

    fn snapshot(&self, key: &str) -> Vec<(Uuid, Callback)> {
        self.subscribers
            .read()
            .get(key)
            .map(|callbacks| {
                callbacks
                    .iter()
                    .map(|(id, cb)| (*id, cb.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Handle for one registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: Uuid,
    key: String,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unsubscribe explicitly.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(&self.key, self.id) {
                debug!(key = %self.key, subscription = %self.id, "Unsubscribed");
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .finish()
    }
}

enum Dispatch {
    Event(String, CacheEvent),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

pub struct Notifier {
    registry: Arc<Registry>,
    tx: mpsc::UnboundedSender<Dispatch>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    /// Start the dispatcher task. Must be called from within a tokio runtime.
    pub fn spawn() -> Self {
        let registry = Arc::new(Registry::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(dispatch(registry.clone(), rx));

        Self {
            registry,
            tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn subscribe<F>(&self, key: &str, callback: F) -> Subscription
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.registry.insert(key, id, Arc::new(callback));
        debug!(key = %key, subscription = %id, "Subscribed");

        Subscription {
            id,
            key: key.to_string(),
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        subscription.cancel();
    }

    pub fn has_subscribers(&self, key: &str) -> bool {
        self.registry.subscribers.read().contains_key(key)
    }

    pub fn subscriber_count(&self, key: &str) -> usize {
        self.registry
            .subscribers
            .read()
            .get(key)
            .map_or(0, HashMap::len)
    }

    /// Queue `event` for the subscribers of `key`. Never blocks.
    pub fn publish(&self, key: &str, event: CacheEvent) {
        if !self.has_subscribers(key) {
            return;
        }
        if self.tx.send(Dispatch::Event(key.to_string(), event)).is_err() {
            debug!(key = %key, "Notifier stopped, dropping event");
        }
    }

    /// Wait until every event published so far has been delivered.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Dispatch::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub async fn shutdown(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        if self.tx.send(Dispatch::Shutdown).is_ok() {
            let _ = task.await;
        }
    }
}

async fn dispatch(registry: Arc<Registry>, mut rx: mpsc::UnboundedReceiver<Dispatch>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            Dispatch::Event(key, event) => {
                for (id, callback) in registry.snapshot(&key) {
                    let outcome = catch_unwind(AssertUnwindSafe(|| callback(&event)));
                    if outcome.is_err() {
                        warn!(key = %key, subscription = %id, "Subscriber callback panicked");
                    }
                }
            }
            Dispatch::Flush(ack) => {
                let _ = ack.send(());
            }
            Dispatch::Shutdown => break,
        }
    }
}
