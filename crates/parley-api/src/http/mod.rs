//! REST API layer: router, envelope, errors and handlers.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
