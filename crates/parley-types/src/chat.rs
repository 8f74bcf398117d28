//! Chat message, session snapshot, and reply types for Parley.
//!
//! These types model widget conversations: the messages exchanged within a
//! session, read-only snapshots of session metadata, store-wide statistics,
//! and the reply handed back to the caller for a single turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::error::ChatError;

/// Author of a message within a session.
///
/// Only two roles are ever stored. The system instruction sent to the model
/// is synthesized per request and never lives in session history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(ChatError::InvalidInput(format!(
                "invalid message role: '{other}'"
            ))),
        }
    }
}

/// A single message within a chat session.
///
/// `timestamp` is set by the store when the message is appended and is never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Metadata about a live session, without its messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Milliseconds since the session was created.
    pub age_ms: i64,
}

/// Aggregate statistics across every live session.
///
/// Ages are measured from `created_at` and are zero when the store is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub active_sessions: usize,
    pub total_messages: usize,
    pub oldest_age_ms: i64,
    pub newest_age_ms: i64,
}

/// Where the reply for a turn came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    /// Answered from the knowledge base without calling the model.
    KnowledgeBase,
    /// Generated by the external model.
    Model,
    /// The model call failed and a canned apology was returned instead.
    Apology,
    /// The session hit its message ceiling.
    RateLimited,
}

impl fmt::Display for ReplySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplySource::KnowledgeBase => write!(f, "knowledge_base"),
            ReplySource::Model => write!(f, "model"),
            ReplySource::Apology => write!(f, "apology"),
            ReplySource::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// The outcome of a single `respond` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub text: String,
    pub source: ReplySource,
}

impl ChatReply {
    pub fn new(text: impl Into<String>, source: ReplySource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }

    /// Whether this turn was recorded in session history.
    ///
    /// Rate-limited turns leave the session untouched.
    pub fn is_persisted(&self) -> bool {
        self.source != ReplySource::RateLimited
    }
}
