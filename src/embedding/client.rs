use super::{EmbeddingError, EmbeddingProvider};
use crate::config::Config;
use async_openai::{
    config::OpenAIConfig,
    types::CreateEmbeddingRequestArgs,
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Embedding client for any OpenAI-compatible `/embeddings` endpoint
/// (llama.cpp server, Ollama, OpenAI itself).
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(config: &Config) -> Self {
        let mut embedding_config = OpenAIConfig::new().with_api_base(&config.embedding_url);

        if let Some(key) = &config.embedding_api_key {
            embedding_config = embedding_config.with_api_key(key);
        } else {
            embedding_config = embedding_config.with_api_key("unused");
        }

        Self {
            client: Client::with_config(embedding_config),
            model: config.embedding_model.clone(),
            timeout_secs: config.embedding_timeout_secs,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.client.embeddings().create(request),
        )
        .await
        .map_err(|_| EmbeddingError::Timeout(self.timeout_secs))?
        .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: data.len(),
            });
        }
        // Servers are allowed to return items out of order.
        data.sort_by_key(|item| item.index);

        debug!("Embedded {} texts with model {}", texts.len(), self.model);
        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}
