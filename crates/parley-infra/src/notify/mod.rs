//! Notification sink implementations and the factory that wires them from
//! configuration.

pub mod email;
pub mod webhook;

use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};

use parley_core::notify::sink::{BoxNotificationSink, FanoutSink, LogSink};
use parley_types::config::NotificationConfig;
use parley_types::error::NotifyError;

use self::email::EmailSink;
use self::webhook::WebhookSink;

/// Sinks built from `[notifications]`.
pub struct NotificationSinks {
    /// Receives every exchange.
    pub exchange: BoxNotificationSink,
    /// Shared with the transcript endpoint when email is configured.
    pub email: Option<Arc<EmailSink>>,
}

/// Build the exchange sink and, if configured, the email sink.
///
/// Disabled notifications (or enabled ones with no target) fall back to
/// [`LogSink`]. A sink that fails to build is skipped with a warning.
pub fn build_sinks(
    config: &NotificationConfig,
    smtp_password: Option<SecretString>,
) -> NotificationSinks {
    if !config.enabled {
        info!("Notifications disabled, logging exchanges only");
        return NotificationSinks {
            exchange: BoxNotificationSink::new(LogSink),
            email: None,
        };
    }

    let mut sinks = Vec::new();

    let email = config
        .email
        .as_ref()
        .and_then(|c| match EmailSink::new(c, smtp_password) {
            Ok(sink) => Some(Arc::new(sink)),
            Err(e) => {
                warn!(error = %e, "Email notifications disabled");
                None
            }
        });
    if let Some(sink) = &email {
        sinks.push(BoxNotificationSink::new(sink.clone()));
    }

    if let Some(webhook) = &config.webhook {
        match WebhookSink::new(webhook) {
            Ok(sink) => sinks.push(BoxNotificationSink::new(sink)),
            Err(e) => warn!(error = %e, "Webhook notifications disabled"),
        }
    }

    let exchange = match sinks.len() {
        0 => {
            warn!("Notifications enabled but no sink could be built, logging exchanges only");
            BoxNotificationSink::new(LogSink)
        }
        1 => sinks.remove(0),
        _ => BoxNotificationSink::new(FanoutSink::new(sinks)),
    };

    NotificationSinks { exchange, email }
}

/// Build just the email sink, for the transcript endpoint and `parley check`.
pub fn build_email_sink(
    config: &NotificationConfig,
    smtp_password: Option<SecretString>,
) -> Result<EmailSink, NotifyError> {
    if !config.enabled {
        return Err(NotifyError::Disabled("notifications.enabled is false".to_string()));
    }
    let email = config
        .email
        .as_ref()
        .ok_or_else(|| NotifyError::Disabled("[notifications.email] is missing".to_string()))?;
    EmailSink::new(email, smtp_password)
}
