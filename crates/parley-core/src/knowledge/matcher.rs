//! Keyword-overlap FAQ matcher.
//!
//! For each entry, the question is lowercased and split into alphanumeric
//! tokens; tokens longer than `min_keyword_len` characters are its
//! significant keywords. An entry matches when at least
//! `ceil(match_ratio * keyword_count)` of them occur as substrings of the
//! lowercased message. Entries are tried in configured order and the first
//! one over the threshold wins, even if a later entry would overlap more.

use parley_types::config::ChatConfig;
use parley_types::knowledge::KnowledgeEntry;

const DEFAULT_MATCH_RATIO: f64 = 0.6;
const DEFAULT_MIN_KEYWORD_LEN: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct KnowledgeMatcher {
    match_ratio: f64,
    min_keyword_len: usize,
}

impl KnowledgeMatcher {
    /// `match_ratio` is clamped to `[0, 1]`. Whatever the ratio, at least one
    /// keyword must be present for a match.
    pub fn new(match_ratio: f64, min_keyword_len: usize) -> Self {
        let match_ratio = if match_ratio.is_finite() {
            match_ratio.clamp(0.0, 1.0)
        } else {
            DEFAULT_MATCH_RATIO
        };
        Self {
            match_ratio,
            min_keyword_len,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.match_ratio, config.min_keyword_len)
    }

    /// Answer of the first entry whose question matches `message`, if any.
    pub fn find_answer<'a>(&self, message: &str, entries: &'a [KnowledgeEntry]) -> Option<&'a str> {
        let message = message.to_lowercase();
        entries
            .iter()
            .find(|entry| self.is_match(&message, &entry.question))
            .map(|entry| entry.answer.as_str())
    }

    /// `normalized_message` must already be lowercase.
    fn is_match(&self, normalized_message: &str, question: &str) -> bool {
        let keywords = self.keywords(question);
        if keywords.is_empty() {
            return false;
        }

        let hits = keywords
            .iter()
            .filter(|k| normalized_message.contains(k.as_str()))
            .count();
        hits >= self.threshold(keywords.len())
    }

    fn keywords(&self, question: &str) -> Vec<String> {
        question
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.chars().count() > self.min_keyword_len)
            .map(str::to_string)
            .collect()
    }

    fn threshold(&self, keyword_count: usize) -> usize {
        let required = (self.match_ratio * keyword_count as f64).ceil() as usize;
        required.max(1)
    }
}

impl Default for KnowledgeMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_RATIO, DEFAULT_MIN_KEYWORD_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hours_entry() -> KnowledgeEntry {
        KnowledgeEntry::new("What are your business hours?", "A")
    }

    fn acme_faqs() -> Vec<KnowledgeEntry> {
        vec![
            hours_entry(),
            KnowledgeEntry::new("How can I contact support?", "B"),
            KnowledgeEntry::new("Do you offer refunds?", "C"),
        ]
    }

    #[test]
    fn matches_business_hours_question() {
        let matcher = KnowledgeMatcher::default();
        let entries = vec![hours_entry()];
        assert_eq!(
            matcher.find_answer("can you tell me your business hours please", &entries),
            Some("A")
        );
    }

    #[test]
    fn greeting_does_not_match() {
        let matcher = KnowledgeMatcher::default();
        assert_eq!(matcher.find_answer("hello", &[hours_entry()]), None);
    }

    #[test]
    fn matching_is_case_insensitive() {
        let matcher = KnowledgeMatcher::default();
        assert_eq!(
            matcher.find_answer("YOUR BUSINESS HOURS?", &[hours_entry()]),
            Some("A")
        );
    }

    #[test]
    fn short_tokens_are_not_keywords() {
        let matcher = KnowledgeMatcher::default();
        assert_eq!(
            matcher.keywords("What are your business hours?"),
            vec!["what", "your", "business", "hours"]
        );
    }

    #[test]
    fn entry_without_keywords_never_matches() {
        let matcher = KnowledgeMatcher::default();
        let entries = vec![KnowledgeEntry::new("Hi?", "never")];
        assert_eq!(matcher.find_answer("hi", &entries), None);
        assert_eq!(matcher.find_answer("", &entries), None);
    }

    #[test]
    fn first_entry_over_threshold_wins() {
        let matcher = KnowledgeMatcher::default();
        let entries = vec![
            KnowledgeEntry::new("refund policy", "first"),
            KnowledgeEntry::new("refund policy details", "second"),
        ];
        assert_eq!(
            matcher.find_answer("what is your refund policy details", &entries),
            Some("first")
        );
    }

    #[test]
    fn picks_matching_entry_from_several() {
        let matcher = KnowledgeMatcher::default();
        assert_eq!(
            matcher.find_answer("how do I contact your support team", &acme_faqs()),
            Some("B")
        );
        assert_eq!(
            matcher.find_answer("do you offer refunds on annual plans", &acme_faqs()),
            Some("C")
        );
    }

    #[test]
    fn substring_hits_count() {
        // "hours" inside "office-hours" still counts: matching is substring-based.
        let matcher = KnowledgeMatcher::default();
        let entries = vec![KnowledgeEntry::new("opening hours", "A")];
        assert_eq!(matcher.find_answer("office-hours and opening", &entries), Some("A"));
    }

    #[test]
    fn ratio_is_configurable() {
        let strict = KnowledgeMatcher::new(1.0, 3);
        assert_eq!(
            strict.find_answer("can you tell me your business hours please", &[hours_entry()]),
            None
        );

        let loose = KnowledgeMatcher::new(0.25, 3);
        assert_eq!(loose.find_answer("business?", &[hours_entry()]), Some("A"));
    }

    #[test]
    fn zero_ratio_still_requires_one_keyword() {
        let matcher = KnowledgeMatcher::new(0.0, 3);
        assert_eq!(matcher.find_answer("hello", &[hours_entry()]), None);
    }

    #[test]
    fn non_finite_ratio_falls_back_to_default() {
        let matcher = KnowledgeMatcher::new(f64::NAN, 3);
        assert_eq!(
            matcher.find_answer("can you tell me your business hours please", &[hours_entry()]),
            Some("A")
        );
    }
}
