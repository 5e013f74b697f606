//! In-memory stand-ins for the transport and the embedding provider.

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::message::Message;
use crate::transport::{PostOutcome, Transport, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

pub fn message(id: &str, author_id: &str, content: &str, timestamp: DateTime<Utc>) -> Message {
    Message {
        id: id.to_string(),
        content: content.to_string(),
        author_name: format!("user{}", author_id),
        author_id: author_id.to_string(),
        timestamp,
        replied_to: None,
    }
}

/// Maps known texts to fixed vectors; unknown texts get a zero vector of the
/// same dimension, which never matches anything.
#[derive(Default)]
pub struct StubEmbedder {
    table: HashMap<String, Vec<f32>>,
    fail: bool,
    log: Mutex<Vec<Vec<String>>>,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn encoded_texts(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().flatten().cloned().collect()
    }

    fn dimension(&self) -> usize {
        self.table.values().next().map(Vec::len).unwrap_or(2)
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.log.lock().unwrap().push(texts.to_vec());
        if self.fail {
            return Err(EmbeddingError::Request("stub failure".to_string()));
        }
        let dim = self.dimension();
        Ok(texts
            .iter()
            .map(|t| self.table.get(t).cloned().unwrap_or_else(|| vec![0.0; dim]))
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Posted {
    pub channel_id: String,
    pub content: String,
    pub reply_to: Option<String>,
}

/// Records every call. Posts succeed with sequential ids unless an outcome
/// has been queued with `queue_post`.
#[derive(Default)]
pub struct MockTransport {
    inbox: Mutex<HashMap<String, Vec<Message>>>,
    fetch_fails: Mutex<bool>,
    fetch_calls: Mutex<usize>,
    post_script: Mutex<VecDeque<PostOutcome>>,
    posted: Mutex<Vec<Posted>>,
    post_attempts: Mutex<usize>,
    deleted: Mutex<Vec<(String, String)>>,
    delete_fails: Mutex<bool>,
    next_id: Mutex<u64>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1000),
            ..Self::default()
        }
    }

    /// Replaces what `fetch` returns for a channel. Give newest first.
    pub fn set_messages(&self, channel_id: &str, messages: Vec<Message>) {
        self.inbox
            .lock()
            .unwrap()
            .insert(channel_id.to_string(), messages);
    }

    pub fn fail_fetches(&self, fail: bool) {
        *self.fetch_fails.lock().unwrap() = fail;
    }

    pub fn fail_deletes(&self, fail: bool) {
        *self.delete_fails.lock().unwrap() = fail;
    }

    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock().unwrap()
    }

    pub fn queue_post(&self, outcome: PostOutcome) {
        self.post_script.lock().unwrap().push_back(outcome);
    }

    pub fn posted(&self) -> Vec<Posted> {
        self.posted.lock().unwrap().clone()
    }

    pub fn post_attempts(&self) -> usize {
        *self.post_attempts.lock().unwrap()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, channel_id: &str, limit: usize) -> Result<Vec<Message>, TransportError> {
        *self.fetch_calls.lock().unwrap() += 1;
        if *self.fetch_fails.lock().unwrap() {
            return Err(TransportError::Status {
                operation: "fetch",
                status: 500,
                body: "mock failure".to_string(),
            });
        }
        Ok(self
            .inbox
            .lock()
            .unwrap()
            .get(channel_id)
            .map(|msgs| msgs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn post(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<PostOutcome, TransportError> {
        *self.post_attempts.lock().unwrap() += 1;
        let scripted = self.post_script.lock().unwrap().pop_front();
        let outcome = match scripted {
            Some(outcome) => outcome,
            None => {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                PostOutcome::Sent {
                    id: next.to_string(),
                }
            }
        };
        if matches!(outcome, PostOutcome::Sent { .. }) {
            self.posted.lock().unwrap().push(Posted {
                channel_id: channel_id.to_string(),
                content: content.to_string(),
                reply_to: reply_to.map(str::to_string),
            });
        }
        Ok(outcome)
    }

    async fn delete(&self, channel_id: &str, message_id: &str) -> Result<(), TransportError> {
        if *self.delete_fails.lock().unwrap() {
            return Err(TransportError::Status {
                operation: "delete",
                status: 404,
                body: "Unknown Message".to_string(),
            });
        }
        self.deleted
            .lock()
            .unwrap()
            .push((channel_id.to_string(), message_id.to_string()));
        Ok(())
    }
}
