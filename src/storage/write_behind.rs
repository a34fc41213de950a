//! Write-behind queue for the durable tier.
//!
//! The engine enqueues operations after its in-memory mutation; a single task
//! applies them to the store in submission order, so the store converges on
//! the same state as memory. Failures are logged and counted, never returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::storage::{PersistedRecord, PersistenceError, PersistentStore};

/// A queued store operation.
#[derive(Debug)]
enum PersistOp {
    Save(String, PersistedRecord),
    Delete(String),
    Clear,
    /// Acknowledged once every earlier op has been applied.
    Flush(oneshot::Sender<()>),
    Shutdown,
}

#[derive(Debug, Default)]
pub struct WriteBehindStats {
    pub applied: AtomicU64,
    pub failed: AtomicU64,
}

pub struct WriteBehind {
    tx: mpsc::UnboundedSender<PersistOp>,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<WriteBehindStats>,
}

impl WriteBehind {
    /// Start the writer task. Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn PersistentStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(WriteBehindStats::default());
        let task = tokio::spawn(run(store, rx, stats.clone()));

        Self {
            tx,
            task: Mutex::new(Some(task)),
            stats,
        }
    }

    pub fn save(&self, key: &str, record: PersistedRecord) {
        self.enqueue(PersistOp::Save(key.to_string(), record));
    }

    pub fn delete(&self, key: &str) {
        self.enqueue(PersistOp::Delete(key.to_string()));
    }

    pub fn clear(&self) {
        self.enqueue(PersistOp::Clear);
    }

    /// Wait until everything enqueued so far has reached the store.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(PersistOp::Flush(ack_tx))
            .map_err(|_| PersistenceError::QueueClosed)?;
        ack_rx.await.map_err(|_| PersistenceError::QueueClosed)
    }

    /// Drain the queue and stop the writer task.
    pub async fn shutdown(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        if self.tx.send(PersistOp::Shutdown).is_err() {
            return;
        }
        if let Err(e) = task.await {
            warn!(error = %e, "Write-behind task ended abnormally");
        }
    }

    pub fn stats(&self) -> &WriteBehindStats {
        &self.stats
    }

    fn enqueue(&self, op: PersistOp) {
        if self.tx.send(op).is_err() {
            warn!("Write-behind queue closed, dropping store operation");
        }
    }
}

async fn run(
    store: Arc<dyn PersistentStore>,
    mut rx: mpsc::UnboundedReceiver<PersistOp>,
    stats: Arc<WriteBehindStats>,
) {
    debug!("Write-behind task started");

    while let Some(op) = rx.recv().await {
        let result = match op {
            PersistOp::Save(key, record) => store.save(&key, &record).await.map_err(|e| (key, e)),
            PersistOp::Delete(key) => store.delete(&key).await.map_err(|e| (key, e)),
            PersistOp::Clear => store.clear().await.map_err(|e| ("*".to_string(), e)),
            PersistOp::Flush(ack) => {
                let _ = ack.send(());
                continue;
            }
            PersistOp::Shutdown => break,
        };

        match result {
            Ok(()) => {
                stats.applied.fetch_add(1, Ordering::Relaxed);
            }
            Err((key, e)) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Persistence failed, continuing memory-only");
            }
        }
    }

    info!(
        applied = stats.applied.load(Ordering::Relaxed),
        failed = stats.failed.load(Ordering::Relaxed),
        "Write-behind task stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::codec::StoredValue;
    use crate::cache::entry::PriorityClass;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn record(n: i64) -> PersistedRecord {
        PersistedRecord {
            value: StoredValue::Raw(json!(n)),
            created_at: 0,
            ttl_ms: 1_000,
            priority_class: PriorityClass::Normal,
            tags: BTreeSet::new(),
            size_bytes: 1,
        }
    }

    #[tokio::test]
    async fn test_ops_applied_in_order() {
        let store = Arc::new(MemoryStore::new());
        let writer = WriteBehind::spawn(store.clone());

        writer.save("a", record(1));
        writer.save("a", record(2));
        writer.save("b", record(3));
        writer.delete("b");
        writer.flush().await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1.value, StoredValue::Raw(json!(2)));
        assert_eq!(writer.stats().applied.load(Ordering::Relaxed), 4);
    }

    struct FailingStore;

    #[async_trait]
    impl PersistentStore for FailingStore {
        async fn load_all(&self) -> Result<Vec<(String, PersistedRecord)>, PersistenceError> {
            Ok(Vec::new())
        }
        async fn save(&self, _: &str, _: &PersistedRecord) -> Result<(), PersistenceError> {
            Err(PersistenceError::QueueClosed)
        }
        async fn delete(&self, _: &str) -> Result<(), PersistenceError> {
            Ok(())
        }
        async fn clear(&self) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_returned() {
        let writer = WriteBehind::spawn(Arc::new(FailingStore));
        writer.save("a", record(1));
        writer.delete("a");
        writer.flush().await.unwrap();

        assert_eq!(writer.stats().failed.load(Ordering::Relaxed), 1);
        assert_eq!(writer.stats().applied.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_shutdown_then_flush_reports_closed() {
        let writer = WriteBehind::spawn(Arc::new(MemoryStore::new()));
        writer.shutdown().await;
        assert!(matches!(
            writer.flush().await,
            Err(PersistenceError::QueueClosed)
        ));
        // Second shutdown is a no-op.
        writer.shutdown().await;
    }
}
