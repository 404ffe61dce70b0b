//! Background Field Expiry Sweeper
//!
//! Lazy expiry removes an expired field when something touches it. A field
//! that expires and is never read again would stay in memory forever, so this
//! module runs "active expiry": a Tokio task that periodically asks the engine
//! to reclaim a bounded number of expired fields.
//!
//! ## Design
//!
//! The sweeper:
//! 1. Sleeps for the current interval (default: 100ms)
//! 2. Calls [`StorageEngine::active_expire_cycle`] with a field and key budget
//! 3. Logs what was reclaimed
//!
//! Each cycle removes at most `fields_per_cycle` fields and inspects at most
//! `keys_per_cycle` keys, so neither a burst of expirations nor a large
//! keyspace turns into one long lock hold.
//!
//! ## Adaptive Frequency
//!
//! If a cycle uses most of its budget, the sweeper runs more often. If it finds
//! nothing, it backs off to save CPU.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Base interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Minimum interval between sweeps (default: 10ms)
    pub min_interval: Duration,

    /// Maximum interval between sweeps (default: 1s)
    pub max_interval: Duration,

    /// Maximum fields removed per cycle (default: 1000)
    pub fields_per_cycle: usize,

    /// Maximum keys inspected per cycle (default: 1000)
    pub keys_per_cycle: usize,

    /// Speed up once a cycle uses more than this fraction of its budget
    pub speedup_threshold: f64,

    /// Slow down once a cycle uses less than this fraction of its budget
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            fields_per_cycle: 1000,
            keys_per_cycle: 1000,
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Starts the expiry sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use flashkv_hash::storage::{StorageEngine, ExpirySweeper, ExpiryConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(engine, ExpiryConfig::default());
    ///
    /// // Dropping the handle stops the task
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            fields_per_cycle = config.fields_per_cycle,
            keys_per_cycle = config.keys_per_cycle,
            interval_ms = config.base_interval.as_millis() as u64,
            "Background field expiry sweeper started"
        );
        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        Self { shutdown_tx }
    }

    /// Stops the expiry sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        info!("Background field expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut current_interval = config.base_interval;
    let budget = config.fields_per_cycle.max(1);
    let key_budget = config.keys_per_cycle.max(1);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(current_interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let cycle = engine.active_expire_cycle(budget, key_budget);
        let usage = cycle.fields_expired as f64 / budget as f64;

        if cycle.budget_exhausted || usage > config.speedup_threshold {
            current_interval = (current_interval / 2).max(config.min_interval);
            debug!(
                expired = cycle.fields_expired,
                usage = %format!("{:.2}%", usage * 100.0),
                new_interval_ms = current_interval.as_millis() as u64,
                "High field expiry rate, speeding up sweeper"
            );
        } else if usage < config.slowdown_threshold && cycle.fields_expired == 0 {
            current_interval = (current_interval * 2).min(config.max_interval);
            trace!(
                new_interval_ms = current_interval.as_millis() as u64,
                "Low field expiry rate, slowing down sweeper"
            );
        }

        if cycle.fields_expired > 0 {
            debug!(
                fields = cycle.fields_expired,
                keys_inspected = cycle.keys_inspected,
                keys_visited = cycle.keys_visited,
                keys_removed = cycle.keys_removed,
                keys_remaining = engine.len(),
                "Expired fields reclaimed"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}
