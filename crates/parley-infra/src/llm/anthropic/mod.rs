//! Anthropic Claude LLM provider implementation.
//!
//! This module provides the [`AnthropicProvider`] which implements the
//! [`LlmProvider`](parley_core::llm::provider::LlmProvider) trait for the
//! non-streaming Anthropic Messages API.

pub mod client;
pub mod types;

pub use client::AnthropicProvider;
