use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of the discussion as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DiscussionState {
    #[default]
    Ready,
    AutoDiscussing,
    Paused,
    UserIntervention,
}

impl DiscussionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscussionState::Ready => "ready",
            DiscussionState::AutoDiscussing => "auto_discussing",
            DiscussionState::Paused => "paused",
            DiscussionState::UserIntervention => "user_intervention",
        }
    }
}

impl From<String> for DiscussionState {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            // the backend uses "discussing" while a manual round is running
            "auto_discussing" | "discussing" => DiscussionState::AutoDiscussing,
            "paused" => DiscussionState::Paused,
            "user_intervention" => DiscussionState::UserIntervention,
            _ => DiscussionState::Ready,
        }
    }
}

impl From<DiscussionState> for String {
    fn from(state: DiscussionState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for DiscussionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who holds the floor and whether they are currently typing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrentSpeaker {
    pub name: String,
    #[serde(alias = "is_speaking", alias = "isTyping")]
    pub is_typing: bool,
}

impl CurrentSpeaker {
    pub fn typing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_typing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Participant {
    pub name: String,
    pub role: String,
    pub avatar: String,
}

/// Discussion status record shared by every update source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    pub auto_discussion_enabled: bool,
    pub user_intervention_pending: bool,
    pub discussion_state: DiscussionState,
    pub discussion_rounds: u64,
    pub current_speaker: CurrentSpeaker,
    pub total_messages: u64,
    pub active_participants: Vec<Participant>,
}

/// Partial status: every present field replaces the current value.
///
/// Deserializes directly from the backend's `/api/status` payload; fields the
/// backend omits or sends as `null` stay `None` and leave local state alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusPatch {
    pub auto_discussion_enabled: Option<bool>,
    pub user_intervention_pending: Option<bool>,
    pub discussion_state: Option<DiscussionState>,
    pub discussion_rounds: Option<u64>,
    pub current_speaker: Option<CurrentSpeaker>,
    pub total_messages: Option<u64>,
    pub active_participants: Option<Vec<Participant>>,
}

impl StatusPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_discussion(mut self, enabled: bool) -> Self {
        self.auto_discussion_enabled = Some(enabled);
        self
    }

    pub fn intervention_pending(mut self, pending: bool) -> Self {
        self.user_intervention_pending = Some(pending);
        self
    }

    pub fn state(mut self, state: DiscussionState) -> Self {
        self.discussion_state = Some(state);
        self
    }

    pub fn speaker(mut self, speaker: CurrentSpeaker) -> Self {
        self.current_speaker = Some(speaker);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Shallow merge onto `prev`, producing the next status.
    pub fn apply(&self, prev: &Status) -> Status {
        let mut next = prev.clone();
        if let Some(v) = self.auto_discussion_enabled {
            next.auto_discussion_enabled = v;
        }
        if let Some(v) = self.user_intervention_pending {
            next.user_intervention_pending = v;
        }
        if let Some(v) = self.discussion_state {
            next.discussion_state = v;
        }
        if let Some(v) = self.discussion_rounds {
            next.discussion_rounds = v;
        }
        if let Some(v) = &self.current_speaker {
            next.current_speaker = v.clone();
        }
        if let Some(v) = self.total_messages {
            next.total_messages = v;
        }
        if let Some(v) = &self.active_participants {
            next.active_participants = v.clone();
        }
        next
    }
}
