//! Plain-text transcript of a session, one block per message.

use parley_types::chat::{ChatMessage, MessageRole};

/// Render messages as `[HH:MM:SS] Sender: content`, separated by blank lines.
///
/// Times are UTC. An empty history renders as an empty string.
pub fn format_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| {
            let sender = match m.role {
                MessageRole::User => "You",
                MessageRole::Assistant => "Assistant",
            };
            format!("[{}] {sender}: {}", m.timestamp.format("%H:%M:%S"), m.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
