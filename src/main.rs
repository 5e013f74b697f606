use chatter::cache::CachedEmbedder;
use chatter::config::Config;
use chatter::dispatcher::{Dispatcher, ShutdownMode};
use chatter::embedding::OpenAiEmbedder;
use chatter::filter::MessageFilter;
use chatter::history::HistoryStore;
use chatter::poller::Poller;
use chatter::response::ResponseEngine;
use chatter::session::{ChannelSession, SessionSettings};
use chatter::transport::{DiscordTransport, Transport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration: {:?}", config);

    let discord = DiscordTransport::new(&config.discord_token, &config.api_base_url)
        .map_err(|e| anyhow::anyhow!("Failed to create transport: {}", e))?;

    // Our own messages must never enter the corpus.
    let self_user_id = match &config.self_user_id {
        Some(id) => Some(id.clone()),
        None => match discord.current_user_id().await {
            Ok(id) => {
                info!("Resolved own user id {}", id);
                Some(id)
            }
            Err(e) => {
                warn!(
                    "SELF_USER_ID unset and lookup failed ({}); own messages may be echoed back",
                    e
                );
                None
            }
        },
    };
    let transport: Arc<dyn Transport> = Arc::new(discord);

    let engine = if config.embeddings_enabled {
        let embedder = Arc::new(OpenAiEmbedder::new(&config));
        let cached = CachedEmbedder::new(embedder, config.embedding_cache_size);
        ResponseEngine::new(Arc::new(cached)).with_threshold(config.similarity_threshold)
    } else {
        info!("Embeddings disabled, using slang replies");
        ResponseEngine::slang()
    };

    let mut filter = MessageFilter::new(
        config.ignored_authors.clone(),
        config.blocked_phrases.clone(),
    );
    if let Some(self_id) = self_user_id {
        filter.ignore_author(self_id);
    }

    let dispatcher = Arc::new(Dispatcher::new(transport.clone(), config.delete_after));
    let session = ChannelSession::new(
        transport,
        HistoryStore::new(&config.history_dir),
        engine,
        dispatcher.clone(),
        filter,
        SessionSettings {
            fetch_limit: config.fetch_limit,
            reply_delay_min: config.reply_delay_min,
            reply_delay_max: config.reply_delay_max,
            ..SessionSettings::default()
        },
    );
    let poller = Poller::new(session, config.channel_ids.clone(), config.poll_interval);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                signal_token.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    info!("Starting agent...");
    poller.run(shutdown).await;

    let mode = if config.drain_deletions_on_shutdown {
        ShutdownMode::Drain
    } else {
        ShutdownMode::Abandon
    };
    dispatcher.shutdown(mode).await;
    info!("Stopped");

    Ok(())
}
