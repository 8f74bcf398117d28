//! Infrastructure layer for Parley.
//!
//! Contains implementations of the ports defined in `parley-core`: the
//! Anthropic Messages API client, SMTP and webhook notification sinks, and
//! the TOML/environment configuration loader.

pub mod config;
pub mod llm;
pub mod notify;
