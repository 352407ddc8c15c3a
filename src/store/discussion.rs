use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{Message, Status, StatusPatch};

/// Tunables for the discussion store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Two messages with the same sender and content closer together than
    /// this are the same message.
    pub duplicate_window: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            duplicate_window: Duration::from_millis(1000),
        }
    }
}

/// Point-in-time copy of the store for rendering.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub messages: Vec<Message>,
    pub status: Status,
    pub room_id: Option<String>,
}

/// Message log plus status record.
///
/// All mutation goes through the methods below; every one of them is an
/// append or a merge.
#[derive(Debug, Clone, Default)]
pub struct DiscussionStore {
    messages: Vec<Message>,
    status: Status,
    room_id: Option<String>,
    options: StoreOptions,
}

impl DiscussionStore {
    pub fn new(options: StoreOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Same id, or same sender and content within the duplicate window.
    pub fn is_duplicate(&self, candidate: &Message) -> bool {
        let window_ms = self.options.duplicate_window.as_millis() as i64;
        self.messages.iter().any(|existing| {
            existing.id == candidate.id
                || (existing.sender == candidate.sender
                    && existing.content == candidate.content
                    && (existing.timestamp - candidate.timestamp)
                        .num_milliseconds()
                        .abs()
                        < window_ms)
        })
    }

    /// Append unless it duplicates an accepted message. Returns whether it was appended.
    pub fn add_message(&mut self, message: Message) -> bool {
        if self.is_duplicate(&message) {
            tracing::debug!(id = %message.id, sender = %message.sender, "duplicate message dropped");
            return false;
        }
        self.messages.push(message);
        self.status.total_messages += 1;
        true
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Replace the status with `transform(previous)`.
    pub fn update_status<F>(&mut self, transform: F)
    where
        F: FnOnce(&Status) -> Status,
    {
        self.status = transform(&self.status);
    }

    pub fn merge_status(&mut self, patch: &StatusPatch) {
        self.update_status(|prev| patch.apply(prev));
    }

    pub fn set_room(&mut self, room_id: Option<String>) {
        self.room_id = room_id;
    }

    /// Back to the initial state: empty log, default status, no room.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.status = Status::default();
        self.room_id = None;
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            messages: self.messages.clone(),
            status: self.status.clone(),
            room_id: self.room_id.clone(),
        }
    }
}
