//! NotificationSink trait and in-process sinks.
//!
//! Same shape as the LLM provider port: an RPITIT trait for concrete sinks,
//! an object-safe `NotificationSinkDyn` with boxed futures, and a
//! `BoxNotificationSink` wrapper chosen at startup. Network sinks (email,
//! webhook) live in parley-infra.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{info, warn};

use parley_types::error::NotifyError;
use parley_types::notification::ExchangeRecord;

/// Receiver of completed exchanges.
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;

    fn notify(
        &self,
        record: &ExchangeRecord,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

impl<T: NotificationSink> NotificationSink for Arc<T> {
    fn name(&self) -> &str {
        NotificationSink::name(&**self)
    }

    fn notify(
        &self,
        record: &ExchangeRecord,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send {
        NotificationSink::notify(&**self, record)
    }
}

/// Object-safe version of [`NotificationSink`].
pub trait NotificationSinkDyn: Send + Sync {
    fn name(&self) -> &str;

    fn notify_boxed<'a>(
        &'a self,
        record: &'a ExchangeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;
}

impl<T: NotificationSink> NotificationSinkDyn for T {
    fn name(&self) -> &str {
        NotificationSink::name(self)
    }

    fn notify_boxed<'a>(
        &'a self,
        record: &'a ExchangeRecord,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>> {
        Box::pin(self.notify(record))
    }
}

/// Type-erased notification sink.
pub struct BoxNotificationSink {
    inner: Box<dyn NotificationSinkDyn + Send + Sync>,
}

impl BoxNotificationSink {
    pub fn new<T: NotificationSink + 'static>(sink: T) -> Self {
        Self {
            inner: Box::new(sink),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn notify(&self, record: &ExchangeRecord) -> Result<(), NotifyError> {
        self.inner.notify_boxed(record).await
    }
}

impl std::fmt::Debug for BoxNotificationSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxNotificationSink")
            .field("name", &self.name())
            .finish()
    }
}

/// Writes each exchange to the log. Used when no external sink is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, record: &ExchangeRecord) -> Result<(), NotifyError> {
        info!(
            session_id = %record.session_id,
            company = %record.company_name,
            user_chars = record.user_message.chars().count(),
            reply_chars = record.reply.chars().count(),
            "Chat exchange"
        );
        Ok(())
    }
}

/// Delivers each record to every inner sink concurrently.
///
/// Individual failures are logged. The fan-out itself only fails when every
/// inner sink failed.
pub struct FanoutSink {
    sinks: Vec<BoxNotificationSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<BoxNotificationSink>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl NotificationSink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn notify(&self, record: &ExchangeRecord) -> Result<(), NotifyError> {
        let results = join_all(self.sinks.iter().map(|sink| sink.notify(record))).await;

        let mut failures = Vec::new();
        for (sink, result) in self.sinks.iter().zip(results) {
            if let Err(e) = result {
                warn!(sink = sink.name(), session_id = %record.session_id, error = %e, "Notification sink failed");
                failures.push(format!("{}: {e}", sink.name()));
            }
        }

        if !self.sinks.is_empty() && failures.len() == self.sinks.len() {
            return Err(NotifyError::Delivery(failures.join("; ")));
        }
        Ok(())
    }
}
