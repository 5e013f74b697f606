//! Inbound message filtering.
//!
//! A message that fails any rule never reaches the corpus, the memory
//! manager or the response engine.

use crate::message::Message;
use std::collections::HashSet;

/// Messages longer than this many characters are dropped.
pub const MAX_CONTENT_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    ignored_authors: HashSet<String>,
    /// Stored lowercased.
    blocked_phrases: Vec<String>,
}

impl MessageFilter {
    pub fn new<A, P>(ignored_authors: A, blocked_phrases: P) -> Self
    where
        A: IntoIterator<Item = String>,
        P: IntoIterator<Item = String>,
    {
        Self {
            ignored_authors: ignored_authors
                .into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            blocked_phrases: blocked_phrases
                .into_iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn ignore_author(&mut self, author_id: impl Into<String>) {
        self.ignored_authors.insert(author_id.into());
    }

    pub fn allows(&self, message: &Message) -> bool {
        if message.content.chars().count() > MAX_CONTENT_CHARS {
            return false;
        }
        if is_all_uppercase(&message.content) {
            return false;
        }
        if self.ignored_authors.contains(&message.author_id) {
            return false;
        }
        !self.contains_blocked_phrase(&message.content)
    }

    fn contains_blocked_phrase(&self, content: &str) -> bool {
        if self.blocked_phrases.is_empty() {
            return false;
        }
        let lowered = content.to_lowercase();
        self.blocked_phrases.iter().any(|p| lowered.contains(p))
    }
}

/// True when the text has at least one cased letter and none of them are
/// lowercase. "OK!!" is shouting, "123" and "?" are not.
pub fn is_all_uppercase(text: &str) -> bool {
    let mut saw_upper = false;
    for c in text.chars() {
        if c.is_lowercase() {
            return false;
        }
        if c.is_uppercase() {
            saw_upper = true;
        }
    }
    saw_upper
}
