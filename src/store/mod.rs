//! Discussion state store.
//!
//! [`DiscussionStore`] holds the transcript and status; [`StoreHandle`] shares
//! it between the realtime connection, the status poller and command flows,
//! serializing every mutation and publishing a [`StoreChange`] after each one
//! so a view can re-render.

pub mod discussion;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

pub use discussion::{DiscussionStore, StoreOptions, StoreSnapshot};

use crate::model::{Message, Status, StatusPatch};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Notification published after a store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    MessageAdded(Message),
    MessagesCleared,
    StatusChanged(Status),
    RoomChanged(Option<String>),
    Reset,
}

/// Cloneable, thread-safe handle to one discussion store.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<Mutex<DiscussionStore>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for StoreHandle {
    fn default() -> Self {
        Self::new(StoreOptions::default())
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.inner.lock();
        f.debug_struct("StoreHandle")
            .field("messages", &store.messages().len())
            .field("room_id", &store.room_id())
            .field("subscribers", &self.changes.receiver_count())
            .finish()
    }
}

impl StoreHandle {
    pub fn new(options: StoreOptions) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(DiscussionStore::new(options))),
            changes,
        }
    }

    /// Subscribe to mutations made after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    /// Called with the store lock held so the feed matches mutation order.
    fn publish(&self, change: StoreChange) {
        // no subscribers is fine
        let _ = self.changes.send(change);
    }

    pub fn add_message(&self, message: Message) -> bool {
        let mut store = self.inner.lock();
        let added = store.add_message(message.clone());
        if added {
            self.publish(StoreChange::MessageAdded(message));
            self.publish(StoreChange::StatusChanged(store.status().clone()));
        }
        added
    }

    /// Append each message in order; returns how many were accepted.
    pub fn add_messages<I>(&self, messages: I) -> usize
    where
        I: IntoIterator<Item = Message>,
    {
        messages
            .into_iter()
            .filter(|message| self.add_message(message.clone()))
            .count()
    }

    pub fn clear_messages(&self) {
        let mut store = self.inner.lock();
        store.clear_messages();
        self.publish(StoreChange::MessagesCleared);
    }

    /// Atomically replace the status with `transform(previous)`.
    ///
    /// Use this form whenever the new value depends on the old one.
    pub fn update_status<F>(&self, transform: F)
    where
        F: FnOnce(&Status) -> Status,
    {
        let mut store = self.inner.lock();
        let before = store.status().clone();
        store.update_status(transform);
        if *store.status() != before {
            self.publish(StoreChange::StatusChanged(store.status().clone()));
        }
    }

    pub fn merge_status(&self, patch: &StatusPatch) {
        self.update_status(|prev| patch.apply(prev));
    }

    pub fn set_room(&self, room_id: Option<String>) {
        let mut store = self.inner.lock();
        let changed = store.room_id() != room_id.as_deref();
        store.set_room(room_id.clone());
        if changed {
            self.publish(StoreChange::RoomChanged(room_id));
        }
    }

    pub fn reset(&self) {
        let mut store = self.inner.lock();
        store.reset();
        self.publish(StoreChange::Reset);
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.lock().snapshot()
    }

    pub fn status(&self) -> Status {
        self.inner.lock().status().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().messages().to_vec()
    }

    pub fn room_id(&self) -> Option<String> {
        self.inner.lock().room_id().map(str::to_string)
    }
}
