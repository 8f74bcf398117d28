use thiserror::Error;

/// Errors surfaced to callers of the chat core.
///
/// Upstream model failures never appear here: the orchestrator converts them
/// into apology replies before returning.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request cancelled before a reply was produced")]
    Cancelled,
}

/// Errors from notification delivery.
///
/// These are logged at the sink boundary and dropped for exchange
/// notifications; only direct requests such as transcripts return them.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifications are not configured: {0}")]
    Disabled(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("delivery failed: {0}")]
    Delivery(String),
}
