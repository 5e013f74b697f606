use crate::message::Message;
use async_trait::async_trait;
use std::time::Duration;

pub mod discord;

pub use discord::DiscordTransport;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid credential header: {0}")]
    InvalidHeader(String),
}

/// Result of a single post attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PostOutcome {
    Sent { id: String },
    RateLimited { retry_after: Duration },
    Failed { status: u16, body: String },
}

/// The chat platform, reduced to the three calls the agent needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Up to `limit` most recent messages, newest first.
    async fn fetch(&self, channel_id: &str, limit: usize) -> Result<Vec<Message>, TransportError>;

    async fn post(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<PostOutcome, TransportError>;

    async fn delete(&self, channel_id: &str, message_id: &str) -> Result<(), TransportError>;
}
