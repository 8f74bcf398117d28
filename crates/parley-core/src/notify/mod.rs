//! Best-effort exchange notifications.
//!
//! - `sink`: the `NotificationSink` port plus in-process sinks
//! - `dispatcher`: bounded queue and worker that decouple delivery from replies
//! - `transcript`: plain-text rendering of a session's history

pub mod dispatcher;
pub mod sink;
pub mod transcript;
