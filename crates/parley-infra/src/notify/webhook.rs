//! JSON webhook notification sink.

use std::time::Duration;

use parley_core::notify::sink::NotificationSink;
use parley_types::config::WebhookConfig;
use parley_types::error::NotifyError;
use parley_types::notification::ExchangeRecord;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs each exchange as camelCase JSON to a fixed URL.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(config: &WebhookConfig) -> Result<Self, NotifyError> {
        if !is_http_url(&config.url) {
            return Err(NotifyError::InvalidAddress(config.url.clone()));
        }

        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| NotifyError::Delivery(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

/// True when `url` parses as an absolute http(s) URL with a host.
pub(crate) fn is_http_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

impl NotificationSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, record: &ExchangeRecord) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(record)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Delivery(format!("webhook returned HTTP {status}")));
        }
        Ok(())
    }
}
