//! Application state wiring all services together.
//!
//! AppState holds the shared service instances used by the REST handlers.
//! [`AppState::init`] also starts the background tasks (session sweeper and
//! notification worker) and hands back their join handles so `serve` can wait
//! for them after shutdown.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use parley_core::chat::orchestrator::ResponseOrchestrator;
use parley_core::chat::store::SessionStore;
use parley_core::chat::sweeper::SessionSweeper;
use parley_core::notify::dispatcher::NotificationDispatcher;
use parley_infra::config::Secrets;
use parley_infra::llm::create_provider;
use parley_infra::notify::build_sinks;
use parley_infra::notify::email::EmailSink;
use parley_types::config::ServiceConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ResponseOrchestrator>,
    pub store: Arc<SessionStore>,
    /// Present when SMTP is configured; used for visitor transcripts.
    pub email: Option<Arc<EmailSink>>,
    pub notifier: Option<NotificationDispatcher>,
    /// Fires when the server begins shutting down.
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

/// Join handles of the tasks started by [`AppState::init`].
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Wait for every task to finish. Call after cancelling the shutdown token.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Background task ended abnormally");
            }
        }
        debug!("Background tasks stopped");
    }
}

impl AppState {
    /// Build the store, model provider and notification pipeline, and start
    /// the background tasks under `shutdown`.
    pub fn init(
        config: &ServiceConfig,
        secrets: Secrets,
        shutdown: CancellationToken,
    ) -> anyhow::Result<(Self, BackgroundTasks)> {
        let store = Arc::new(SessionStore::new());
        let provider = Arc::new(create_provider(&config.model, secrets.anthropic_api_key)?);

        let sinks = build_sinks(&config.notifications, secrets.smtp_password);
        let (notifier, notify_handle) = NotificationDispatcher::spawn(
            sinks.exchange,
            config.notifications.queue_capacity,
            shutdown.clone(),
        );

        let sweep_handle =
            SessionSweeper::from_config(store.clone(), &config.retention).spawn(shutdown.clone());

        let orchestrator = ResponseOrchestrator::new(
            store.clone(),
            provider,
            config.chat.clone(),
            config.model.clone(),
        )
        .with_notifier(notifier.clone());

        info!(
            provider = orchestrator.provider_name(),
            faqs = config.chat.faqs.len(),
            transcripts = sinks.email.is_some(),
            "Services initialized"
        );

        let state = Self {
            orchestrator: Arc::new(orchestrator),
            store,
            email: sinks.email,
            notifier: Some(notifier),
            shutdown,
            started_at: Utc::now(),
        };
        let tasks = BackgroundTasks {
            handles: vec![notify_handle, sweep_handle],
        };
        Ok((state, tasks))
    }
}
