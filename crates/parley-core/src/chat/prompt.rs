//! System instruction and bounded context for the model fallback.
//!
//! The system instruction is rebuilt for every request from the company
//! label and the FAQ set. It is never stored in session history.

use parley_types::chat::ChatMessage;
use parley_types::knowledge::KnowledgeEntry;
use parley_types::llm::Message;

/// Build the system instruction for a customer-service assistant.
pub fn build_system_prompt(company_name: &str, faqs: &[KnowledgeEntry]) -> String {
    let mut prompt = format!(
        "You are an AI customer service assistant for {company_name}. \
         Your goal is to help customers with their questions in a friendly, \
         professional, and helpful manner.\n\n"
    );

    prompt.push_str(
        "Guidelines:\n\
         - Be concise but informative\n\
         - Use a friendly, conversational tone\n\
         - If you don't know something, be honest and offer to connect them with a human\n\
         - Never make up information\n\
         - Keep responses under 200 words\n\
         - Use proper formatting for lists and important information\n\n",
    );

    if !faqs.is_empty() {
        prompt.push_str("Here are some frequently asked questions to help you:\n\n");
        for (i, faq) in faqs.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. Q: {}\n   A: {}\n\n",
                i + 1,
                faq.question,
                faq.answer
            ));
        }
    }

    prompt.push_str(
        "Remember: Be helpful, professional, and empathetic. Your goal is to \
         solve the customer's problem or route them to the right help.",
    );
    prompt
}

/// The last `window` messages of `history` followed by the new user message.
///
/// `history` must not already contain `user_message`.
pub fn build_messages(history: &[ChatMessage], window: usize, user_message: &str) -> Vec<Message> {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|m| Message {
            role: m.role,
            content: m.content.clone(),
        })
        .chain(std::iter::once(Message::user(user_message)))
        .collect()
}
