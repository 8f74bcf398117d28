//! Conversation core for Parley.
//!
//! This crate owns session state and the per-turn decision logic, and defines
//! the "ports" (LLM provider and notification sink traits) that the
//! infrastructure layer implements. It depends only on `parley-types` --
//! never on `parley-infra` or any network crate.

pub mod chat;
pub mod knowledge;
pub mod llm;
pub mod notify;
