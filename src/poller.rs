//! Periodic status reconciliation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::error::ClientError;
use crate::model::StatusPatch;
use crate::store::StoreHandle;

/// Source of authoritative discussion status.
#[async_trait]
pub trait StatusSource: Send + Sync + 'static {
    async fn fetch_status(&self) -> Result<StatusPatch, ClientError>;
}

/// Polls a [`StatusSource`] and merges each result into the store.
pub struct StatusPoller;

impl StatusPoller {
    /// Fetch immediately, then every `interval`, until the handle is stopped or dropped.
    pub fn start(source: Arc<dyn StatusSource>, store: StoreHandle, interval: Duration) -> PollerHandle {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // in-flight fetches die with this set
            let mut inflight = JoinSet::new();

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let source = source.clone();
                        let store = store.clone();
                        inflight.spawn(async move {
                            match source.fetch_status().await {
                                Ok(patch) => {
                                    tracing::debug!(?patch, "status polled");
                                    store.merge_status(&patch);
                                }
                                Err(err) => tracing::warn!(error = %err, "status poll failed"),
                            }
                        });
                    }
                    Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
                }
            }
        });
        PollerHandle { task: Some(task) }
    }
}

/// Owns the polling task. Dropping it stops polling.
#[derive(Debug)]
pub struct PollerHandle {
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiscussionState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(AtomicUsize);

    #[async_trait]
    impl StatusSource for Fixed {
        async fn fetch_status(&self) -> Result<StatusPatch, ClientError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(StatusPatch::new().state(DiscussionState::Paused))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fetch_is_immediate() {
        let source = Arc::new(Fixed(AtomicUsize::new(0)));
        let store = StoreHandle::default();
        let mut handle = StatusPoller::start(source.clone(), store.clone(), Duration::from_secs(3));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
        assert_eq!(store.status().discussion_state, DiscussionState::Paused);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 2);

        handle.stop();
        assert!(!handle.is_running());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }
}
