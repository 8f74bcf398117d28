//! Session state and response orchestration.
//!
//! - `store`: the in-memory `SessionStore` keyed by caller-supplied session id
//! - `sweeper`: recurring eviction task for idle sessions
//! - `prompt`: system instruction and bounded context for the model
//! - `orchestrator`: the per-turn `ResponseOrchestrator`

pub mod clock;
pub mod orchestrator;
pub mod prompt;
pub mod store;
pub mod sweeper;
