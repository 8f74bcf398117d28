//! Shared domain types for Parley.
//!
//! This crate contains the core domain types used across the service:
//! chat messages and session snapshots, knowledge base entries, LLM
//! request/response shapes, notification records, configuration and the
//! error enums shared between layers.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod notification;
