//! Per-channel short-term and long-term memory.
//!
//! Short-term memory is a bounded window of the most recent messages seen
//! in a channel. Long-term memory is an append-only log of key facts that
//! people state about themselves. Neither is persisted.

use crate::message::Message;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Messages kept in the short-term window.
pub const SHORT_TERM_CAPACITY: usize = 20;

const FACT_MARKERS: &[&str] = &[
    "i am ", "i'm ", "im ", "my ", "i like ", "i love ", "i work ", "i live ",
];

#[derive(Debug, Clone, PartialEq)]
pub struct KeyFact {
    pub author_name: String,
    pub text: String,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ShortTermMemory {
    window: VecDeque<Message>,
    capacity: usize,
}

impl Default for ShortTermMemory {
    fn default() -> Self {
        Self::with_capacity(SHORT_TERM_CAPACITY)
    }
}

impl ShortTermMemory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Appends a message, evicting the oldest on overflow.
    pub fn push(&mut self, message: Message) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.window.iter()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LongTermMemory {
    facts: Vec<KeyFact>,
}

impl LongTermMemory {
    pub fn append(&mut self, fact: KeyFact) {
        self.facts.push(fact);
    }

    pub fn facts(&self) -> &[KeyFact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryManager {
    pub short_term: ShortTermMemory,
    pub long_term: LongTermMemory,
}

impl MemoryManager {
    /// Records a newly observed message. Returns true if a key fact was
    /// extracted from it.
    pub fn observe(&mut self, message: &Message) -> bool {
        let fact = extract_fact(message);
        self.short_term.push(message.clone());
        match fact {
            Some(fact) => {
                self.long_term.append(fact);
                true
            }
            None => false,
        }
    }
}

/// A message counts as a key fact when it contains a first-person
/// self-description marker.
pub fn extract_fact(message: &Message) -> Option<KeyFact> {
    let text = message.content.trim();
    if text.is_empty() {
        return None;
    }
    let padded = format!("{} ", text.to_lowercase());
    if !FACT_MARKERS
        .iter()
        .any(|marker| padded.starts_with(marker) || padded.contains(&format!(" {}", marker)))
    {
        return None;
    }
    Some(KeyFact {
        author_name: message.author_name.clone(),
        text: text.to_string(),
        observed_at: message.timestamp,
    })
}
