use crate::embedding::EmbeddingProvider;
use tracing::{debug, warn};

/// Texts and their vectors, index-aligned. Rebuilt from the persisted corpus
/// every cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingIndex {
    texts: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

impl EmbeddingIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_parts(texts: Vec<String>, vectors: Vec<Vec<f32>>) -> Option<Self> {
        (texts.len() == vectors.len()).then_some(Self { texts, vectors })
    }

    /// Embeds every non-blank text. Never fails: provider errors are logged
    /// and produce an empty index, which makes the engine fall back to
    /// generic replies.
    pub async fn build(provider: &dyn EmbeddingProvider, texts: Vec<String>) -> Self {
        let texts: Vec<String> = texts
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .collect();
        if texts.is_empty() {
            debug!("Index: no texts to embed");
            return Self::empty();
        }

        match provider.encode(&texts).await {
            Ok(vectors) => match Self::from_parts(texts, vectors) {
                Some(index) => {
                    debug!("Index: built with {} entries", index.len());
                    index
                }
                None => {
                    warn!("Index: provider returned a mismatched vector count");
                    Self::empty()
                }
            },
            Err(e) => {
                warn!("Index: embedding failed, using empty index: {}", e);
                Self::empty()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn text(&self, i: usize) -> Option<&str> {
        self.texts.get(i).map(String::as_str)
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubEmbedder;

    #[tokio::test]
    async fn test_blank_texts_never_reach_provider() {
        let stub = StubEmbedder::new().with("hello", vec![1.0, 0.0]);
        let index = EmbeddingIndex::build(
            &stub,
            vec!["".to_string(), "hello".to_string(), " \n\t".to_string()],
        )
        .await;

        assert_eq!(index.len(), 1);
        assert_eq!(index.text(0), Some("hello"));
        assert_eq!(stub.encoded_texts(), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_all_blank_skips_provider() {
        let stub = StubEmbedder::new();
        let index = EmbeddingIndex::build(&stub, vec!["   ".to_string()]).await;
        assert!(index.is_empty());
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_gives_empty_index() {
        let stub = StubEmbedder::failing();
        let index = EmbeddingIndex::build(&stub, vec!["hello".to_string()]).await;
        assert!(index.is_empty());
    }

    #[test]
    fn test_from_parts_requires_alignment() {
        assert!(EmbeddingIndex::from_parts(vec!["a".to_string()], vec![]).is_none());
        assert!(EmbeddingIndex::from_parts(vec!["a".to_string()], vec![vec![1.0]]).is_some());
    }
}
