//! Service configuration loader for Parley.
//!
//! Reads `parley.toml` and deserializes it into [`ServiceConfig`]. Falls back
//! to defaults when the file is missing or malformed. Secrets never come from
//! the file: they are read from the environment into [`Secrets`].

use std::fmt;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};

use parley_types::config::ServiceConfig;

use crate::notify::webhook::is_http_url;

pub const DEFAULT_CONFIG_FILE: &str = "parley.toml";

pub const ENV_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_SMTP_PASSWORD: &str = "PARLEY_SMTP_PASSWORD";
pub const ENV_PORT: &str = "PARLEY_PORT";
pub const ENV_MODEL: &str = "PARLEY_MODEL";

/// Load configuration from `path`.
///
/// - If the file does not exist, returns [`ServiceConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_config(path: &Path) -> ServiceConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return ServiceConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return ServiceConfig::default();
        }
    };

    match toml::from_str::<ServiceConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            ServiceConfig::default()
        }
    }
}

/// Apply `PARLEY_PORT` and `PARLEY_MODEL` on top of the file configuration.
///
/// `lookup` is `std::env::var(..).ok()` in production and a map in tests.
pub fn apply_env_overrides(config: &mut ServiceConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(port) = lookup(ENV_PORT) {
        match port.trim().parse::<u16>() {
            Ok(port) => config.server.port = port,
            Err(_) => tracing::warn!("Ignoring {ENV_PORT}={port:?}: not a valid port"),
        }
    }

    if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
        config.model.model = model.trim().to_string();
    }
}

/// Credentials resolved from the environment.
///
/// Values are wrapped in [`SecretString`] so they never show up in `Debug`
/// output or logs.
#[derive(Debug, Default)]
pub struct Secrets {
    pub anthropic_api_key: Option<SecretString>,
    pub smtp_password: Option<SecretString>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let secret = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
        };
        Self {
            anthropic_api_key: secret(ENV_API_KEY),
            smtp_password: secret(ENV_SMTP_PASSWORD),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Works, but probably not what the operator intended.
    Warning,
    /// The service will not behave correctly until fixed.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub message: String,
}

impl ConfigIssue {
    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Check a loaded configuration for problems worth reporting at startup.
pub fn validate(config: &ServiceConfig, secrets: &Secrets) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();

    match &secrets.anthropic_api_key {
        None => issues.push(ConfigIssue::error(format!(
            "{ENV_API_KEY} is not set; every model fallback will return an apology"
        ))),
        Some(key) if !key.expose_secret().starts_with("sk-ant-") => {
            issues.push(ConfigIssue::warning(format!(
                "{ENV_API_KEY} does not look like an Anthropic key (expected prefix sk-ant-)"
            )));
        }
        Some(_) => {}
    }

    let chat = &config.chat;
    if chat.company_name == parley_types::config::ChatConfig::default().company_name {
        issues.push(ConfigIssue::warning(
            "chat.company_name is not set; the assistant will introduce itself for \"our company\"",
        ));
    }
    if chat.max_messages_per_session == 0 {
        issues.push(ConfigIssue::warning(
            "chat.max_messages_per_session is 0; every message will get the rate-limit notice",
        ));
    }
    if chat.history_window == 0 {
        issues.push(ConfigIssue::warning(
            "chat.history_window is 0; the model will see no prior conversation",
        ));
    }
    if !(0.0..=1.0).contains(&chat.match_ratio) {
        issues.push(ConfigIssue::warning(format!(
            "chat.match_ratio {} is outside [0, 1] and will be clamped",
            chat.match_ratio
        )));
    }

    if !(0.0..=1.0).contains(&config.model.temperature) {
        issues.push(ConfigIssue::warning(format!(
            "model.temperature {} is outside [0, 1]",
            config.model.temperature
        )));
    }

    let retention = &config.retention;
    if retention.max_age_secs == 0 {
        issues.push(ConfigIssue::error(
            "retention.max_age_secs is 0; sessions will be evicted on every sweep",
        ));
    } else if retention.sweep_interval_secs > retention.max_age_secs {
        issues.push(ConfigIssue::warning(
            "retention.sweep_interval_secs exceeds max_age_secs; idle sessions will outlive the retention window",
        ));
    }

    let notifications = &config.notifications;
    if notifications.enabled {
        if notifications.email.is_none() && notifications.webhook.is_none() {
            issues.push(ConfigIssue::error(
                "notifications are enabled but neither [notifications.email] nor [notifications.webhook] is configured",
            ));
        }
        if let Some(email) = &notifications.email {
            if email.to.as_deref().is_none_or(|to| to.trim().is_empty()) {
                issues.push(ConfigIssue::error(
                    "notifications.email.to is empty; exchange notifications have nowhere to go",
                ));
            }
            if email.username.is_none() || secrets.smtp_password.is_none() {
                issues.push(ConfigIssue::warning(format!(
                    "SMTP credentials are incomplete (notifications.email.username and {ENV_SMTP_PASSWORD})"
                )));
            }
        }
        if let Some(webhook) = &notifications.webhook {
            if !is_http_url(&webhook.url) {
                issues.push(ConfigIssue::error(format!(
                    "notifications.webhook.url {:?} is not an http(s) URL",
                    webhook.url
                )));
            }
        }
    }

    issues
}

/// Whether any issue is severe enough to refuse a clean bill of health.
pub fn has_errors(issues: &[ConfigIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}
