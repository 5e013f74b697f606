//! Reply selection.
//!
//! The engine embeds the incoming text, finds the most similar message in the
//! channel's corpus and, if it is similar enough, sends back a lightly
//! mutated copy of it. Anything else gets a generic acknowledgment.

use crate::embedding::{encode_one, EmbeddingProvider};
use crate::index::EmbeddingIndex;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.5;

pub const GENERIC_ACKNOWLEDGMENTS: &[&str] = &[
    "Tell me more!",
    "Interesting!",
    "Go on...",
    "Oh really?",
    "Fair enough.",
    "Huh, I see.",
];

pub const SLANG_REPLIES: &[&str] = &[
    "Bruh 💀",
    "Sheeesh 🔥",
    "For real 🤔",
    "Nah fr",
    "Lmao 😂",
    "Ayo?",
    "Chill 🙃",
    "Deadass?",
    "Yikes",
    "Smh",
    "Wym?",
    "Say less",
];

pub const GREETINGS: &[&str] = &[
    "hey everyone",
    "what's up?",
    "yo, anyone around?",
    "hi all 👋",
    "quiet in here today",
    "how's everyone doing?",
];

const FILLERS: &[&str] = &["like", "honestly", "tbh", "literally", "kinda", "lowkey", "you know"];

const INTERJECTIONS: &[&str] = &["lol", "ikr", "fr", "haha", "lmao", "ngl"];

pub struct ResponseEngine {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    threshold: f32,
}

impl ResponseEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider: Some(provider),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// The embedding-free variant: every reply is a random slang line.
    pub fn slang() -> Self {
        Self {
            provider: None,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn uses_embeddings(&self) -> bool {
        self.provider.is_some()
    }

    /// Builds the similarity index for a corpus. The slang variant never calls
    /// a provider and always gets an empty index.
    pub async fn build_index(&self, texts: Vec<String>) -> EmbeddingIndex {
        match &self.provider {
            Some(provider) => EmbeddingIndex::build(provider.as_ref(), texts).await,
            None => EmbeddingIndex::empty(),
        }
    }

    /// Always returns a non-empty reply.
    pub async fn respond(&self, input_text: &str, index: &EmbeddingIndex) -> String {
        let Some(provider) = &self.provider else {
            return pick(SLANG_REPLIES, &mut rand::thread_rng());
        };
        if index.is_empty() {
            return pick(GENERIC_ACKNOWLEDGMENTS, &mut rand::thread_rng());
        }

        let query = match encode_one(provider.as_ref(), input_text).await {
            Ok(query) => query,
            Err(e) => {
                warn!("Response: failed to embed input, using generic reply: {}", e);
                return pick(GENERIC_ACKNOWLEDGMENTS, &mut rand::thread_rng());
            }
        };

        let mut rng = rand::thread_rng();
        match best_match(&query, index) {
            Some((i, score)) if score > self.threshold => {
                debug!("Response: matched corpus entry {} with similarity {:.3}", i, score);
                match index.text(i) {
                    Some(text) => modify_message(text, &mut rng),
                    None => pick(GENERIC_ACKNOWLEDGMENTS, &mut rng),
                }
            }
            best => {
                debug!("Response: best similarity {:?} below threshold", best.map(|b| b.1));
                pick(GENERIC_ACKNOWLEDGMENTS, &mut rng)
            }
        }
    }
}

/// Index and score of the most similar vector. `None` for an empty index.
pub fn best_match(query: &[f32], index: &EmbeddingIndex) -> Option<(usize, f32)> {
    index
        .vectors()
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let score = cosine_similarity(query, v);
            (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
        })
        .fold(None, |best, (i, score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((i, score)),
        })
}

/// Returns a value in `[-1.0, 1.0]`, or `0.0` for zero-norm or
/// mismatched-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Makes a matched message sound less copied.
///
/// With more than 3 words a filler is inserted between two words; if that
/// leaves more than 5 words an interior word is dropped; then a closing
/// interjection is appended half the time.
pub fn modify_message<R: Rng>(text: &str, rng: &mut R) -> String {
    let mut words: Vec<&str> = text.split_whitespace().collect();

    if words.len() > 3 {
        let pos = rng.gen_range(1..words.len());
        words.insert(pos, pick_str(FILLERS, rng));
    }
    if words.len() > 5 {
        let pos = rng.gen_range(1..words.len() - 1);
        words.remove(pos);
    }
    if rng.gen_bool(0.5) {
        words.push(pick_str(INTERJECTIONS, rng));
    }

    if words.is_empty() {
        return text.to_string();
    }
    words.join(" ")
}

pub fn pick<R: Rng>(set: &[&str], rng: &mut R) -> String {
    pick_str(set, rng).to_string()
}

fn pick_str<'a, R: Rng>(set: &[&'a str], rng: &mut R) -> &'a str {
    set.choose(rng).copied().unwrap_or("...")
}
