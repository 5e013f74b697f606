//! Per-channel state machine.
//!
//! Each polling cycle a channel either replies to new questions, greets an
//! idle room, or stays quiet. A channel is `ACTIVE` until it greets, then
//! `IDLE` until it replies to someone again.

use crate::dispatcher::Dispatcher;
use crate::filter::MessageFilter;
use crate::history::{ChannelCorpus, HistoryStore};
use crate::memory::MemoryManager;
use crate::message::Message;
use crate::response::{pick, ResponseEngine, GREETINGS};
use crate::transport::Transport;
use anyhow::Context as AnyhowContext;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Minimum gap between our messages before a question gets a reply.
pub const REPLY_COOLDOWN: Duration = Duration::from_secs(60);
/// How far back a regular fetch looks.
pub const RECENT_WINDOW: Duration = Duration::from_secs(5 * 60);
/// How far back the first fetch for a channel without history looks.
pub const BOOTSTRAP_WINDOW: Duration = Duration::from_secs(30 * 60);
pub const BOOTSTRAP_FETCH_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub fetch_limit: usize,
    pub idle_min: Duration,
    pub idle_max: Duration,
    pub reply_delay_min: Duration,
    pub reply_delay_max: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            fetch_limit: 50,
            idle_min: Duration::from_secs(120),
            idle_max: Duration::from_secs(300),
            reply_delay_min: Duration::from_secs(3),
            reply_delay_max: Duration::from_secs(10),
        }
    }
}

impl SessionSettings {
    /// Uniform in `[idle_min, idle_max]`, drawn fresh each cycle.
    fn idle_threshold(&self) -> Duration {
        random_between(self.idle_min, self.idle_max)
    }

    fn reply_delay(&self) -> Duration {
        random_between(self.reply_delay_min, self.reply_delay_max)
    }
}

fn random_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
    Duration::from_millis(millis as u64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTimerState {
    pub last_message_time: DateTime<Utc>,
    pub idle: bool,
}

impl ChannelTimerState {
    /// Starts `ACTIVE`, as if we last spoke a minute ago.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_message_time: now - chrono::Duration::minutes(1),
            idle: false,
        }
    }

    /// Time since we last spoke. Zero if the clock went backwards.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_message_time).to_std().unwrap_or(Duration::ZERO)
    }

    fn spoke(&mut self, now: DateTime<Utc>, idle: bool) {
        self.last_message_time = now;
        self.idle = idle;
    }
}

/// Everything the agent remembers about one channel between cycles.
#[derive(Debug, Clone)]
pub struct ChannelState {
    pub timer: ChannelTimerState,
    pub memory: MemoryManager,
    /// Corpus from a cycle whose save failed. Used instead of the file until
    /// a save succeeds, so merged messages are not seen as new again.
    pub unsaved: Option<ChannelCorpus>,
}

impl ChannelState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            timer: ChannelTimerState::new(now),
            memory: MemoryManager::default(),
            unsaved: None,
        }
    }
}

/// Wall-clock time for a cycle: `now` at the start, advanced by the
/// monotonic time spent since.
struct CycleClock {
    start: DateTime<Utc>,
    started: Instant,
}

impl CycleClock {
    fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            started: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let spent = chrono::Duration::from_std(self.started.elapsed())
            .unwrap_or(chrono::Duration::zero());
        self.start + spent
    }
}

/// What one cycle did for one channel. `merged` counts messages that were
/// new to the corpus.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Replied { replies: usize, merged: usize },
    Greeted { merged: usize },
    Quiet { merged: usize },
    Skipped { reason: String },
}

pub struct ChannelSession {
    transport: Arc<dyn Transport>,
    history: HistoryStore,
    engine: ResponseEngine,
    dispatcher: Arc<Dispatcher>,
    filter: MessageFilter,
    settings: SessionSettings,
}

impl ChannelSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        history: HistoryStore,
        engine: ResponseEngine,
        dispatcher: Arc<Dispatcher>,
        filter: MessageFilter,
        settings: SessionSettings,
    ) -> Self {
        Self {
            transport,
            history,
            engine,
            dispatcher,
            filter,
            settings,
        }
    }

    /// Runs one cycle. Never fails: anything that goes wrong becomes
    /// `CycleOutcome::Skipped` and the channel is retried next cycle.
    pub async fn run_cycle(
        &self,
        channel_id: &str,
        state: &mut ChannelState,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        match self.try_cycle(channel_id, state, now).await {
            Ok(outcome) => outcome,
            Err(e) => CycleOutcome::Skipped {
                reason: format!("{:#}", e),
            },
        }
    }

    async fn try_cycle(
        &self,
        channel_id: &str,
        state: &mut ChannelState,
        now: DateTime<Utc>,
    ) -> anyhow::Result<CycleOutcome> {
        let clock = CycleClock::new(now);
        let (mut corpus, bootstrap) = match &state.unsaved {
            Some(corpus) => (corpus.clone(), None),
            None => self
                .load_corpus(channel_id, now)
                .await
                .context("loading history")?,
        };
        let index = self.engine.build_index(corpus.texts()).await;

        // A bootstrap fetch already holds the latest messages.
        let recent = match bootstrap {
            Some(fetched) => self.within_window(fetched, now, RECENT_WINDOW),
            None => self
                .fetch_recent(channel_id, now)
                .await
                .context("fetching recent messages")?,
        };

        let mut merged = 0usize;
        let mut replies = 0usize;
        // Fetched newest first; handle oldest first so the corpus stays
        // newest first and replies go out in conversation order.
        for message in recent.into_iter().rev() {
            if !corpus.insert(message.clone()) {
                continue;
            }
            merged += 1;
            state.memory.observe(&message);

            if message.is_question() && state.timer.elapsed(clock.now()) >= REPLY_COOLDOWN {
                let reply = self.engine.respond(&message.content, &index).await;
                self.pause_before_send().await;
                debug!(
                    "Replying to message {} in channel {}: {}",
                    message.id, channel_id, reply
                );
                self.dispatcher
                    .send(channel_id, &reply, Some(&message.id))
                    .await;
                state.timer.spoke(clock.now(), false);
                replies += 1;
            }
        }

        let outcome = if replies > 0 {
            CycleOutcome::Replied { replies, merged }
        } else if merged == 0
            && !state.timer.idle
            && state.timer.elapsed(clock.now()) > self.settings.idle_threshold()
        {
            let greeting = pick(GREETINGS, &mut rand::thread_rng());
            self.dispatcher.send(channel_id, &greeting, None).await;
            state.timer.spoke(clock.now(), true);
            CycleOutcome::Greeted { merged }
        } else {
            CycleOutcome::Quiet { merged }
        };

        if let Err(e) = self.history.save(channel_id, &corpus).await {
            warn!(
                "Keeping {} messages for channel {} in memory until history can be saved",
                corpus.len(),
                channel_id
            );
            state.unsaved = Some(corpus);
            return Err(e.context("saving history"));
        }
        state.unsaved = None;
        Ok(outcome)
    }

    /// The persisted corpus, or a fresh one built from the last
    /// `BOOTSTRAP_WINDOW` of channel history if nothing usable is on disk.
    /// A bootstrap also returns the raw fetch for the recent-window pass.
    async fn load_corpus(
        &self,
        channel_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<(ChannelCorpus, Option<Vec<Message>>)> {
        if let Some(corpus) = self.history.load(channel_id).await? {
            return Ok((corpus, None));
        }

        info!("No usable history for channel {}, bootstrapping", channel_id);
        let fetched = self
            .transport
            .fetch(channel_id, BOOTSTRAP_FETCH_LIMIT)
            .await
            .context("bootstrap fetch")?;
        let kept = self.within_window(fetched.clone(), now, BOOTSTRAP_WINDOW);
        info!(
            "Bootstrapped channel {} with {} messages",
            channel_id,
            kept.len()
        );
        Ok((ChannelCorpus::from_newest_first(kept), Some(fetched)))
    }

    async fn fetch_recent(
        &self,
        channel_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Message>> {
        let fetched = self
            .transport
            .fetch(channel_id, self.settings.fetch_limit)
            .await?;
        Ok(self.within_window(fetched, now, RECENT_WINDOW))
    }

    fn within_window(
        &self,
        messages: Vec<Message>,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Vec<Message> {
        let cutoff = chrono::Duration::from_std(window)
            .map(|w| now - w)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        messages
            .into_iter()
            .filter(|m| m.timestamp >= cutoff && self.filter.allows(m))
            .collect()
    }

    async fn pause_before_send(&self) {
        let delay = self.settings.reply_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
