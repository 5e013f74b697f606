//! Per-channel message history: the bounded corpus type and its flat-file
//! store.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum number of messages retained per channel.
pub const CORPUS_CAP: usize = 500;

/// Newest-first, id-unique, bounded list of messages for one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelCorpus {
    messages: Vec<Message>,
}

impl ChannelCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a corpus from a newest-first list, dropping duplicate ids
    /// (first occurrence wins) and anything past the cap.
    pub fn from_newest_first(messages: Vec<Message>) -> Self {
        let mut corpus = Self::new();
        for message in messages {
            if corpus.messages.len() >= CORPUS_CAP {
                break;
            }
            if !corpus.contains(&message.id) {
                corpus.messages.push(message);
            }
        }
        corpus
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    /// Prepends `message` as the newest entry. Returns false and leaves the
    /// corpus untouched if the id is already present.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        self.messages.insert(0, message);
        self.messages.truncate(CORPUS_CAP);
        true
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Message texts in corpus order, for index building.
    pub fn texts(&self) -> Vec<String> {
        self.messages.iter().map(|m| m.content.clone()).collect()
    }
}

#[derive(Serialize)]
struct HistoryFileRef<'a> {
    channel_id: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct HistoryFile {
    #[allow(dead_code)]
    channel_id: String,
    messages: Vec<serde_json::Value>,
}

/// Stores one pretty-printed JSON file per channel under `dir`.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, channel_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", channel_id))
    }

    /// Loads the persisted corpus for a channel.
    ///
    /// Returns `Ok(None)` when there is no usable file: either it does not
    /// exist or it cannot be parsed. Unparseable records inside a valid file
    /// are skipped individually.
    pub async fn load(&self, channel_id: &str) -> anyhow::Result<Option<ChannelCorpus>> {
        let path = self.path_for(channel_id);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("History: no file for channel {}", channel_id);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let file: HistoryFile = match serde_json::from_str(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "History: malformed history file {:?}, treating as empty: {}",
                    path, e
                );
                return Ok(None);
            }
        };

        let mut messages = Vec::with_capacity(file.messages.len());
        for value in file.messages {
            match serde_json::from_value::<Message>(value) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(
                    "History: skipping malformed record in channel {}: {}",
                    channel_id, e
                ),
            }
        }

        debug!(
            "History: loaded {} messages for channel {}",
            messages.len(),
            channel_id
        );
        Ok(Some(ChannelCorpus::from_newest_first(messages)))
    }

    /// Writes the newest `CORPUS_CAP` entries, replacing the previous file
    /// atomically.
    pub async fn save(&self, channel_id: &str, corpus: &ChannelCorpus) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let retained = &corpus.messages()[..corpus.len().min(CORPUS_CAP)];
        let body = serde_json::to_string_pretty(&HistoryFileRef {
            channel_id,
            messages: retained,
        })?;

        let path = self.path_for(channel_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(
            "History: saved {} messages for channel {}",
            retained.len(),
            channel_id
        );
        Ok(())
    }
}
