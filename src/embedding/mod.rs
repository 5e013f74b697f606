use async_trait::async_trait;

pub mod client;

pub use client::OpenAiEmbedder;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding request timed out after {0}s")]
    Timeout(u64),

    #[error("provider returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

/// Maps text to fixed-length vectors. Deterministic for a given model and
/// input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Convenience wrapper for a batch of one.
pub async fn encode_one(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = provider.encode(&[text.to_string()]).await?;
    match vectors.len() {
        1 => Ok(vectors.remove(0)),
        got => Err(EmbeddingError::CountMismatch { expected: 1, got }),
    }
}
