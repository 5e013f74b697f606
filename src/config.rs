use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub channel_ids: Vec<String>,
    pub api_base_url: String,
    pub self_user_id: Option<String>,
    pub ignored_authors: Vec<String>,
    pub blocked_phrases: Vec<String>,
    pub history_dir: String,

    // Embedding provider
    pub embeddings_enabled: bool,
    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_api_key: Option<String>,
    pub embedding_timeout_secs: u64,
    pub embedding_cache_size: usize,
    pub similarity_threshold: f32,

    // Timing
    pub fetch_limit: usize,
    pub poll_interval: Duration,
    pub delete_after: Duration,
    pub reply_delay_min: Duration,
    pub reply_delay_max: Duration,
    pub drain_deletions_on_shutdown: bool,
}

/// Optional file-based filter lists, merged with the env lists.
#[derive(Debug, Default, Deserialize)]
pub struct FilterLists {
    #[serde(default)]
    pub ignored_authors: Vec<String>,
    #[serde(default)]
    pub blocked_phrases: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let channel_ids = split_list(
            &env::var("CHANNEL_IDS").map_err(|_| anyhow::anyhow!("CHANNEL_IDS must be set"))?,
        );
        if channel_ids.is_empty() {
            return Err(anyhow::anyhow!("CHANNEL_IDS must list at least one channel"));
        }

        let filters_file = env::var("FILTERS_FILE").unwrap_or_else(|_| "filters.toml".to_string());
        let file_lists = Self::load_filter_lists(&filters_file)?;
        let mut ignored_authors = env_list("IGNORED_AUTHORS");
        ignored_authors.extend(file_lists.ignored_authors);
        let mut blocked_phrases = env_list("BLOCKED_PHRASES");
        blocked_phrases.extend(file_lists.blocked_phrases);

        let reply_delay_min = env_duration("REPLY_DELAY_MIN", Duration::from_secs(3));
        let reply_delay_max = env_duration("REPLY_DELAY_MAX", Duration::from_secs(10));

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            channel_ids,
            api_base_url: env::var("DISCORD_API_BASE")
                .unwrap_or_else(|_| "https://discord.com/api/v9".to_string()),
            self_user_id: env::var("SELF_USER_ID")
                .ok()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            ignored_authors,
            blocked_phrases,
            history_dir: env::var("HISTORY_DIR").unwrap_or_else(|_| "data/history".to_string()),
            embeddings_enabled: env::var("EMBEDDINGS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            embedding_url: env::var("EMBEDDING_URL")
                .unwrap_or_else(|_| "http://localhost:8080/v1".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "local-model".to_string()),
            embedding_api_key: env::var("EMBEDDING_API_KEY").ok(),
            embedding_timeout_secs: env::var("EMBEDDING_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            embedding_cache_size: env::var("EMBEDDING_CACHE_SIZE")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            similarity_threshold: env::var("SIMILARITY_THRESHOLD")
                .unwrap_or_else(|_| "0.5".to_string())
                .parse()
                .unwrap_or(0.5),
            fetch_limit: env::var("FETCH_LIMIT")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            poll_interval: env_duration("POLL_INTERVAL", Duration::from_secs(5)),
            delete_after: env_duration("DELETE_AFTER", Duration::from_secs(30)),
            reply_delay_min,
            reply_delay_max: reply_delay_max.max(reply_delay_min),
            drain_deletions_on_shutdown: env::var("DRAIN_DELETIONS_ON_SHUTDOWN")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }

    /// Reads `path` if it exists. A file that exists but does not parse is an
    /// error, so a typo cannot silently disable the blocklist.
    pub fn load_filter_lists(path: &str) -> anyhow::Result<FilterLists> {
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Invalid filters file {}: {}", path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FilterLists::default()),
            Err(e) => Err(anyhow::anyhow!("Failed to read filters file {}: {}", path, e)),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("channel_ids", &self.channel_ids)
            .field("api_base_url", &self.api_base_url)
            .field("self_user_id", &self.self_user_id)
            .field("ignored_authors", &self.ignored_authors)
            .field("blocked_phrases", &self.blocked_phrases.len())
            .field("history_dir", &self.history_dir)
            .field("embeddings_enabled", &self.embeddings_enabled)
            .field("embedding_url", &self.embedding_url)
            .field("embedding_model", &self.embedding_model)
            .field(
                "embedding_api_key",
                &self.embedding_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("embedding_timeout_secs", &self.embedding_timeout_secs)
            .field("embedding_cache_size", &self.embedding_cache_size)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("fetch_limit", &self.fetch_limit)
            .field("poll_interval", &self.poll_interval)
            .field("delete_after", &self.delete_after)
            .field("reply_delay_min", &self.reply_delay_min)
            .field("reply_delay_max", &self.reply_delay_max)
            .field(
                "drain_deletions_on_shutdown",
                &self.drain_deletions_on_shutdown,
            )
            .finish()
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key).map(|raw| split_list(&raw)).unwrap_or_default()
}

/// Parses a humantime duration such as `5s` or `1m 30s`, falling back to
/// `default` when unset or invalid.
fn env_duration(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|raw| humantime::parse_duration(raw.trim()).ok())
        .unwrap_or(default)
}
