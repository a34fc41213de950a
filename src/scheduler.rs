//! Periodic sweep driver.
//!
//! The engine never schedules itself. The owner starts a [`SweepScheduler`],
//! which calls [`CacheEngine::sweep`] on a fixed interval until stopped.
//!
//! ```ignore
//! let handle = SweepScheduler::new(engine.clone(), config.sweep_interval()).spawn();
//! // ...
//! handle.stop().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::CacheEngine;

pub struct SweepScheduler {
    engine: Arc<CacheEngine>,
    interval: Duration,
}

impl SweepScheduler {
    pub fn new(engine: Arc<CacheEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Start sweeping in a background task.
    pub fn spawn(self) -> SweepHandle {
        let shutdown = CancellationToken::new();
        let rounds = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(self.run(shutdown.clone(), rounds.clone()));

        SweepHandle {
            shutdown,
            rounds,
            task: Some(task),
        }
    }

    /// Sweep until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken, rounds: Arc<AtomicU64>) {
        info!(interval_secs = self.interval.as_secs_f64(), "Sweep scheduler starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Sweep scheduler shutting down");
                    break;
                }

                _ = interval.tick() => {
                    let expired = self.engine.sweep().await;
                    let round = rounds.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(round, expired, "Sweep round");
                }
            }
        }
    }
}

/// Running scheduler. Dropping the handle without [`SweepHandle::stop`]
/// cancels the task but does not wait for it.
pub struct SweepHandle {
    shutdown: CancellationToken,
    rounds: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Sweep rounds completed so far.
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel the scheduler and wait for it to exit.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Sweep scheduler ended abnormally");
            }
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
