//! Knowledge base entries.

use serde::{Deserialize, Serialize};

/// A pre-authored question/answer pair checked before calling the model.
///
/// Loaded once at startup from configuration, or supplied per request by the
/// widget. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub question: String,
    pub answer: String,
}

impl KnowledgeEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}
