use crate::transport::{PostOutcome, Transport};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// What to do with deletions that have not fired yet when the process stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Wait for every pending deletion to fire.
    Drain,
    /// Cancel pending deletions and leave the messages in place.
    Abandon,
}

/// Delayed self-cleanup of sent messages.
///
/// Each deletion is its own task and only holds the transport plus the
/// channel and message ids. Failures are logged and dropped.
pub struct DeletionScheduler {
    transport: Arc<dyn Transport>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl DeletionScheduler {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn schedule(&self, channel_id: &str, message_id: &str, delay: Duration) {
        let transport = self.transport.clone();
        let cancel = self.cancel.clone();
        let channel_id = channel_id.to_string();
        let message_id = message_id.to_string();

        debug!(
            "Scheduling deletion of message {} in channel {} in {:?}",
            message_id, channel_id, delay
        );
        self.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Deletion of message {} abandoned", message_id);
                }
                _ = tokio::time::sleep(delay) => {
                    match transport.delete(&channel_id, &message_id).await {
                        Ok(()) => debug!("Deleted message {} in channel {}", message_id, channel_id),
                        Err(e) => warn!(
                            "Failed to delete message {} in channel {}: {}",
                            message_id, channel_id, e
                        ),
                    }
                }
            }
        });
    }

    /// Deletions scheduled but not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    pub async fn shutdown(&self, mode: ShutdownMode) {
        let pending = self.pending();
        if mode == ShutdownMode::Abandon {
            self.cancel.cancel();
        }
        self.tracker.close();
        if pending > 0 {
            info!("Waiting for {} pending deletions ({:?})", pending, mode);
        }
        self.tracker.wait().await;
    }
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    deletions: DeletionScheduler,
    delete_after: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, delete_after: Duration) -> Self {
        Self {
            deletions: DeletionScheduler::new(transport.clone()),
            transport,
            delete_after,
        }
    }

    /// Posts a message, waiting out rate limits for as long as the server
    /// asks. Returns the new message id, or `None` if the post was abandoned.
    /// A sent message is deleted again after `delete_after`.
    pub async fn send(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Option<String> {
        loop {
            match self.transport.post(channel_id, content, reply_to).await {
                Ok(PostOutcome::Sent { id }) => {
                    info!("Sent message {} to channel {}", id, channel_id);
                    self.deletions.schedule(channel_id, &id, self.delete_after);
                    return Some(id);
                }
                Ok(PostOutcome::RateLimited { retry_after }) => {
                    warn!(
                        "Rate limited in channel {}, retrying in {:?}",
                        channel_id, retry_after
                    );
                    tokio::time::sleep(retry_after).await;
                }
                Ok(PostOutcome::Failed { status, body }) => {
                    error!(
                        "Failed to send message to channel {}: HTTP {} {}",
                        channel_id, status, body
                    );
                    return None;
                }
                Err(e) => {
                    error!("Failed to send message to channel {}: {}", channel_id, e);
                    return None;
                }
            }
        }
    }

    pub async fn delete(&self, channel_id: &str, message_id: &str) -> bool {
        match self.transport.delete(channel_id, message_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to delete message {} in channel {}: {}",
                    message_id, channel_id, e
                );
                false
            }
        }
    }

    pub fn pending_deletions(&self) -> usize {
        self.deletions.pending()
    }

    pub async fn shutdown(&self, mode: ShutdownMode) {
        self.deletions.shutdown(mode).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    fn dispatcher(transport: &Arc<MockTransport>) -> Dispatcher {
        Dispatcher::new(transport.clone(), Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_retries_rate_limit_then_deletes() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_post(PostOutcome::RateLimited {
            retry_after: Duration::from_secs(2),
        });
        transport.queue_post(PostOutcome::RateLimited {
            retry_after: Duration::from_millis(500),
        });
        let dispatcher = dispatcher(&transport);

        let started = tokio::time::Instant::now();
        let id = dispatcher.send("c1", "hello", Some("42")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2500));
        assert_eq!(transport.post_attempts(), 3);
        assert_eq!(transport.posted().len(), 1);
        assert_eq!(transport.posted()[0].reply_to.as_deref(), Some("42"));

        assert_eq!(dispatcher.pending_deletions(), 1);
        assert!(transport.deleted().is_empty());

        dispatcher.shutdown(ShutdownMode::Drain).await;
        assert_eq!(transport.deleted(), vec![("c1".to_string(), id)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletion_waits_for_delay() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher(&transport);
        dispatcher.send("c1", "hello", None).await.unwrap();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(transport.deleted().is_empty());
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.deleted().len(), 1);
        assert_eq!(dispatcher.pending_deletions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_abandons_without_retry() {
        let transport = Arc::new(MockTransport::new());
        transport.queue_post(PostOutcome::Failed {
            status: 403,
            body: "Missing Permissions".to_string(),
        });
        let dispatcher = dispatcher(&transport);

        assert!(dispatcher.send("c1", "hello", None).await.is_none());
        assert_eq!(transport.post_attempts(), 1);
        assert_eq!(dispatcher.pending_deletions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_cancels_pending() {
        let transport = Arc::new(MockTransport::new());
        let dispatcher = dispatcher(&transport);
        dispatcher.send("c1", "one", None).await.unwrap();
        dispatcher.send("c2", "two", None).await.unwrap();
        assert_eq!(dispatcher.pending_deletions(), 2);

        dispatcher.shutdown(ShutdownMode::Abandon).await;
        assert!(transport.deleted().is_empty());
        assert_eq!(dispatcher.pending_deletions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletion_failure_is_swallowed() {
        let transport = Arc::new(MockTransport::new());
        transport.fail_deletes(true);
        let dispatcher = dispatcher(&transport);
        dispatcher.send("c1", "hello", None).await.unwrap();

        dispatcher.shutdown(ShutdownMode::Drain).await;
        assert!(transport.deleted().is_empty());
        assert!(!dispatcher.delete("c1", "1").await);
    }
}
