use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Display name the backend uses for system announcements.
pub const SYSTEM_SENDER: &str = "시스템";

/// Display name used for messages typed by the local user.
pub const USER_SENDER: &str = "사용자";

/// Semantic tag of a chat message; selects how it is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    User,
    System,
    ExpertQuestion,
    Response,
    Conclusion,
    #[default]
    Message,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::System => "system",
            MessageType::ExpertQuestion => "expert_question",
            MessageType::Response => "response",
            MessageType::Conclusion => "conclusion",
            MessageType::Message => "message",
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "user" => MessageType::User,
            "system" => MessageType::System,
            "expert_question" => MessageType::ExpertQuestion,
            "response" => MessageType::Response,
            "conclusion" => MessageType::Conclusion,
            _ => MessageType::Message,
        }
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry of the discussion transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub content: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "message_type", alias = "messageType", default)]
    pub message_type: MessageType,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        message_type: MessageType,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            content: content.into(),
            timestamp,
            message_type,
        }
    }

    /// Build a message typed locally by the user, stamped now.
    ///
    /// Used for optimistic echo before the backend broadcasts its own copy;
    /// the store's duplicate predicate absorbs the later server copy when
    /// sender and content match within the window.
    pub fn local(content: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            id: format!("user-{}", Uuid::new_v4()),
            sender: USER_SENDER.to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            message_type,
        }
    }

    /// Build a client-side system notice.
    pub fn system_notice(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: format!("local_{}", now.timestamp_millis()),
            sender: SYSTEM_SENDER.to_string(),
            content: content.into(),
            timestamp: now,
            message_type: MessageType::System,
        }
    }

    pub fn is_system(&self) -> bool {
        self.message_type == MessageType::System
    }
}

/// Parse an ISO-8601 timestamp, accepting both offset-qualified RFC 3339
/// and naive date-times. The backend stamps messages with its naive local
/// time, so naive values are read in the local timezone.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(local_to_utc)
}

/// Interpret a wall-clock time in the local timezone.
pub fn local_to_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}
