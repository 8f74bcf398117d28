//! Fire-and-forget delivery of exchange notifications.
//!
//! The orchestrator hands each persisted exchange to [`NotificationDispatcher::dispatch`],
//! which only enqueues it. A single worker task drains the bounded queue and
//! calls the sink, so a slow or failing sink can delay other notifications but
//! never a reply. A full queue drops the record with a warning.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_types::notification::ExchangeRecord;

use super::sink::BoxNotificationSink;

/// Upper bound on a single delivery attempt.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cheap, cloneable handle to the notification queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<ExchangeRecord>,
    dropped: Arc<AtomicU64>,
}

impl NotificationDispatcher {
    /// Spawn the delivery worker with [`DEFAULT_DELIVERY_TIMEOUT`].
    pub fn spawn(
        sink: BoxNotificationSink,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        Self::spawn_with_timeout(sink, capacity, DEFAULT_DELIVERY_TIMEOUT, cancel)
    }

    /// Spawn the delivery worker.
    ///
    /// On cancellation the worker delivers whatever is already queued, then
    /// exits. `capacity` is raised to 1 if zero.
    pub fn spawn_with_timeout(
        sink: BoxNotificationSink,
        capacity: usize,
        delivery_timeout: Duration,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ExchangeRecord>(capacity.max(1));

        let handle = tokio::spawn(async move {
            debug!(sink = sink.name(), "Notification worker started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(record) => deliver(&sink, &record, delivery_timeout).await,
                        None => break,
                    },
                }
            }

            rx.close();
            while let Ok(record) = rx.try_recv() {
                deliver(&sink, &record, delivery_timeout).await;
            }
            debug!(sink = sink.name(), "Notification worker stopped");
        });

        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            handle,
        )
    }

    /// Enqueue a record without waiting. Returns `false` if it was dropped.
    pub fn dispatch(&self, record: ExchangeRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(session_id = %record.session_id, "Notification queue full, dropping exchange");
                false
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(session_id = %record.session_id, "Notification worker stopped, dropping exchange");
                false
            }
        }
    }

    /// Records dropped because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn deliver(sink: &BoxNotificationSink, record: &ExchangeRecord, limit: Duration) {
    match tokio::time::timeout(limit, sink.notify(record)).await {
        Ok(Ok(())) => debug!(sink = sink.name(), session_id = %record.session_id, "Notification delivered"),
        Ok(Err(e)) => warn!(
            sink = sink.name(),
            session_id = %record.session_id,
            error = %e,
            "Notification failed"
        ),
        Err(_) => warn!(
            sink = sink.name(),
            session_id = %record.session_id,
            timeout_secs = limit.as_secs(),
            "Notification timed out"
        ),
    }
}
