use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roundtable::model::{CurrentSpeaker, DiscussionState};
use roundtable::{ClientError, StatusPatch, StatusPoller, StatusSource, StoreHandle};
use tokio::time::sleep;

/// Fails the first `failures` calls, and sleeps `stall` on the first one.
struct Flaky {
    calls: AtomicUsize,
    failures: usize,
    stall: Duration,
}

impl Flaky {
    fn new(failures: usize, stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            failures,
            stall,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusSource for Flaky {
    async fn fetch_status(&self) -> Result<StatusPatch, ClientError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 && !self.stall.is_zero() {
            sleep(self.stall).await;
        }
        if n < self.failures {
            return Err(ClientError::Transport("connection refused".into()));
        }
        Ok(StatusPatch::new()
            .state(DiscussionState::AutoDiscussing)
            .speaker(CurrentSpeaker::typing("김창의")))
    }
}

#[tokio::test(start_paused = true)]
async fn keeps_polling_through_failures() {
    let source = Flaky::new(2, Duration::ZERO);
    let store = StoreHandle::default();
    let _poller = StatusPoller::start(source.clone(), store.clone(), Duration::from_secs(3));

    sleep(Duration::from_millis(10)).await;
    assert_eq!(source.calls(), 1);
    assert_eq!(store.status().discussion_state, DiscussionState::Ready);

    sleep(Duration::from_secs(6)).await;
    assert_eq!(source.calls(), 3);
    let status = store.status();
    assert_eq!(status.discussion_state, DiscussionState::AutoDiscussing);
    assert!(status.current_speaker.is_typing);
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_does_not_hold_back_the_next_tick() {
    let source = Flaky::new(0, Duration::from_secs(10));
    let store = StoreHandle::default();
    let _poller = StatusPoller::start(source.clone(), store.clone(), Duration::from_secs(3));

    sleep(Duration::from_millis(3_010)).await;
    assert_eq!(source.calls(), 2);
    // the second fetch answered while the first is still stalled
    assert_eq!(store.status().discussion_state, DiscussionState::AutoDiscussing);
}

#[tokio::test(start_paused = true)]
async fn polled_status_keeps_fields_the_backend_omits() {
    let source = Flaky::new(0, Duration::ZERO);
    let store = StoreHandle::default();
    store.merge_status(&StatusPatch::new().auto_discussion(true).intervention_pending(true));

    let _poller = StatusPoller::start(source, store.clone(), Duration::from_secs(3));
    sleep(Duration::from_millis(10)).await;

    let status = store.status();
    assert!(status.auto_discussion_enabled);
    assert!(status.user_intervention_pending);
    assert_eq!(status.discussion_state, DiscussionState::AutoDiscussing);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_stops_polling() {
    let source = Flaky::new(0, Duration::ZERO);
    let store = StoreHandle::default();
    let poller = StatusPoller::start(source.clone(), store, Duration::from_secs(3));

    sleep(Duration::from_millis(10)).await;
    assert!(poller.is_running());
    drop(poller);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(source.calls(), 1);
}
