//! Service configuration types for Parley.
//!
//! `ServiceConfig` represents the top-level `parley.toml`. Every section and
//! field has a default so an empty file (or no file at all) yields a working
//! single-node setup. Secrets are never read from this file.

use std::time::Duration as StdDuration;

use serde::{Deserialize, Serialize};

use crate::knowledge::KnowledgeEntry;

/// Top-level configuration for the Parley service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub chat: ChatConfig,
    pub retention: RetentionConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            allowed_origins: Vec::new(),
        }
    }
}

/// Generation parameters for the external model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Override for the provider endpoint (proxies, tests).
    pub base_url: Option<String>,
    /// Upper bound on a single model call before it counts as failed.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-haiku-20240307".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            base_url: None,
            timeout_secs: 60,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.timeout_secs)
    }
}

/// Conversation policy: branding, limits, context window and FAQ matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub company_name: String,
    /// User messages allowed per session before the rate-limit notice.
    pub max_messages_per_session: usize,
    /// Most recent history messages forwarded to the model.
    pub history_window: usize,
    pub rate_limit_notice: String,
    /// Fraction of significant keywords that must appear for an FAQ match.
    pub match_ratio: f64,
    /// Question tokens must be longer than this to count as keywords.
    pub min_keyword_len: usize,
    pub faqs: Vec<KnowledgeEntry>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            company_name: "our company".to_string(),
            max_messages_per_session: 50,
            history_window: 10,
            rate_limit_notice: "You've reached the message limit for this session. \
                Please contact us directly if you need further assistance."
                .to_string(),
            match_ratio: 0.6,
            min_keyword_len: 3,
            faqs: Vec::new(),
        }
    }
}

/// Session retention and eviction schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.max_age_secs).unwrap_or(i64::MAX))
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Exchange notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Pending notifications buffered before new ones are dropped.
    pub queue_capacity: usize,
    pub email: Option<EmailConfig>,
    pub webhook: Option<WebhookConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_capacity: 64,
            email: None,
            webhook: None,
        }
    }
}

/// SMTP settings. The password comes from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    /// Implicit TLS (usually port 465). STARTTLS is used otherwise.
    pub secure: bool,
    pub username: Option<String>,
    pub from: String,
    /// Recipient of exchange notifications.
    pub to: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            secure: false,
            username: None,
            from: "noreply@example.com".to_string(),
            to: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
    /// Export spans through OpenTelemetry (stdout exporter).
    pub otel: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
            otel: false,
        }
    }
}

/// Per-request context supplied by the widget.
///
/// Recognised fields only; anything absent falls back to [`ChatConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    pub company_name: Option<String>,
    pub faqs: Option<Vec<KnowledgeEntry>>,
}
