//! Route handlers, grouped by resource.

pub mod chat;
pub mod history;
pub mod session;
pub mod stats;
pub mod transcript;
