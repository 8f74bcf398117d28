//! Notification payloads handed to sinks after an exchange is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed exchange: the user's message and the reply it received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRecord {
    pub session_id: String,
    pub user_message: String,
    pub reply: String,
    pub company_name: String,
    pub occurred_at: DateTime<Utc>,
}
