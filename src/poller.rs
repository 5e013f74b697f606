use crate::session::{ChannelSession, ChannelState, CycleOutcome};
use chrono::Utc;
use std::collections::HashMap;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives every configured channel through one session cycle, then sleeps.
/// Channels are handled one after another on a single task.
pub struct Poller {
    session: ChannelSession,
    channel_ids: Vec<String>,
    states: HashMap<String, ChannelState>,
    interval: Duration,
}

impl Poller {
    pub fn new(session: ChannelSession, channel_ids: Vec<String>, interval: Duration) -> Self {
        let now = Utc::now();
        let states = channel_ids
            .iter()
            .map(|id| (id.clone(), ChannelState::new(now)))
            .collect();
        Self {
            session,
            channel_ids,
            states,
            interval,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            "Polling {} channels every {:?}",
            self.channel_ids.len(),
            self.interval
        );
        loop {
            self.run_once().await;
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Poller stopping");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One pass over all channels.
    pub async fn run_once(&mut self) -> Vec<(String, CycleOutcome)> {
        let mut outcomes = Vec::with_capacity(self.channel_ids.len());
        for channel_id in &self.channel_ids {
            let now = Utc::now();
            let state = self
                .states
                .entry(channel_id.clone())
                .or_insert_with(|| ChannelState::new(now));
            let outcome = self.session.run_cycle(channel_id, state, now).await;
            log_outcome(channel_id, &outcome);
            outcomes.push((channel_id.clone(), outcome));
        }
        outcomes
    }

    pub fn state(&self, channel_id: &str) -> Option<&ChannelState> {
        self.states.get(channel_id)
    }
}

fn log_outcome(channel_id: &str, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Replied { replies, merged } => info!(
            "Channel {}: sent {} replies, merged {} new messages",
            channel_id, replies, merged
        ),
        CycleOutcome::Greeted { .. } => info!("Channel {}: idle, sent greeting", channel_id),
        CycleOutcome::Quiet { merged } => {
            debug!("Channel {}: quiet, merged {} new messages", channel_id, merged)
        }
        CycleOutcome::Skipped { reason } => {
            warn!("Channel {}: skipped this cycle: {}", channel_id, reason)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::filter::MessageFilter;
    use crate::history::HistoryStore;
    use crate::response::ResponseEngine;
    use crate::session::SessionSettings;
    use crate::testing::{message, MockTransport};
    use std::sync::Arc;

    fn poller(dir: &std::path::Path, transport: Arc<MockTransport>, channels: &[&str]) -> Poller {
        let dispatcher = Arc::new(Dispatcher::new(transport.clone(), Duration::from_secs(30)));
        let session = ChannelSession::new(
            transport,
            HistoryStore::new(dir),
            ResponseEngine::slang(),
            dispatcher,
            MessageFilter::default(),
            SessionSettings {
                reply_delay_min: Duration::ZERO,
                reply_delay_max: Duration::ZERO,
                ..SessionSettings::default()
            },
        );
        Poller::new(
            session,
            channels.iter().map(|c| c.to_string()).collect(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.set_messages(
            "good",
            vec![message("1", "9", "hello?", Utc::now() - chrono::Duration::seconds(2))],
        );
        // "broken" has a directory where its history file should be.
        std::fs::create_dir_all(dir.path().join("broken.json")).unwrap();
        let mut poller = poller(dir.path(), transport.clone(), &["broken", "good"]);

        let outcomes = poller.run_once().await;
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0].1, CycleOutcome::Skipped { .. }));
        // Bootstrap swallows the first sighting of "good"; it is history now.
        assert!(matches!(outcomes[1].1, CycleOutcome::Quiet { .. }));
        assert!(dir.path().join("good.json").exists());
        assert!(poller.state("good").is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::new());
        let poller = poller(dir.path(), transport, &["c1"]);
        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), poller.run(token))
            .await
            .expect("poller should stop after cancellation");
    }
}
