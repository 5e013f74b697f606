use crate::embedding::{EmbeddingError, EmbeddingProvider};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Remembers vectors by exact text so that rebuilding a channel's index every
/// cycle only sends texts the provider has not seen recently.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lookup(&self, texts: &[String]) -> (Vec<Option<Vec<f32>>>, Vec<String>) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut misses = Vec::new();
        let found = texts
            .iter()
            .map(|text| {
                let hit = cache.get(text).cloned();
                if hit.is_none() && !misses.contains(text) {
                    misses.push(text.clone());
                }
                hit
            })
            .collect();
        (found, misses)
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let (mut found, misses) = self.lookup(texts);

        if !misses.is_empty() {
            debug!(
                "Embedding cache: {} hits, {} misses",
                texts.len() - misses.len(),
                misses.len()
            );
            let vectors = self.inner.encode(&misses).await?;
            if vectors.len() != misses.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: misses.len(),
                    got: vectors.len(),
                });
            }

            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            for (text, vector) in misses.iter().zip(vectors) {
                for (slot, wanted) in found.iter_mut().zip(texts) {
                    if slot.is_none() && wanted == text {
                        *slot = Some(vector.clone());
                    }
                }
                cache.put(text.clone(), vector);
            }
        }

        found
            .into_iter()
            .map(|v| v.ok_or(EmbeddingError::CountMismatch {
                expected: texts.len(),
                got: 0,
            }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubEmbedder;

    #[tokio::test]
    async fn test_only_misses_reach_provider() {
        let stub = Arc::new(
            StubEmbedder::new()
                .with("a", vec![1.0, 0.0])
                .with("b", vec![0.0, 1.0]),
        );
        let cached = CachedEmbedder::new(stub.clone(), 10);

        let first = cached
            .encode(&["a".to_string(), "b".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(first, vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0]]);
        assert_eq!(stub.encoded_texts(), vec!["a", "b"]);

        let second = cached.encode(&["b".to_string()]).await.unwrap();
        assert_eq!(second, vec![vec![0.0, 1.0]]);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts() {
        let stub = Arc::new(
            StubEmbedder::new()
                .with("a", vec![1.0])
                .with("b", vec![2.0]),
        );
        let cached = CachedEmbedder::new(stub.clone(), 1);

        cached.encode(&["a".to_string()]).await.unwrap();
        cached.encode(&["b".to_string()]).await.unwrap();
        cached.encode(&["a".to_string()]).await.unwrap();
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let stub = Arc::new(StubEmbedder::failing());
        let cached = CachedEmbedder::new(stub, 10);
        assert!(cached.encode(&["x".to_string()]).await.is_err());
    }
}
