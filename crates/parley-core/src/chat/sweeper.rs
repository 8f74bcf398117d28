//! Recurring eviction of idle sessions.
//!
//! The sweeper is an explicit background task owned by the process: it is
//! spawned once at startup and stops when its `CancellationToken` fires.
//! Each tick calls [`SessionStore::sweep`], so the store's clock decides what
//! counts as idle.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use parley_types::config::RetentionConfig;

use super::store::SessionStore;

/// Periodically evicts sessions idle longer than `max_age`.
pub struct SessionSweeper {
    store: Arc<SessionStore>,
    max_age: chrono::Duration,
    interval: Duration,
}

impl SessionSweeper {
    pub fn new(store: Arc<SessionStore>, max_age: chrono::Duration, interval: Duration) -> Self {
        Self {
            store,
            max_age,
            interval,
        }
    }

    pub fn from_config(store: Arc<SessionStore>, retention: &RetentionConfig) -> Self {
        Self::new(store, retention.max_age(), retention.sweep_interval())
    }

    /// Spawn the sweep loop on the current runtime.
    ///
    /// The first sweep happens one full interval after spawning.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            info!(
                interval_secs = self.interval.as_secs(),
                max_age_secs = self.max_age.num_seconds(),
                "Session sweeper started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Session sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = self.store.sweep(self.max_age);
                        debug!(evicted, remaining = self.store.session_count(), "Sweep complete");
                    }
                }
            }
        })
    }
}
