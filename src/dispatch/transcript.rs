//! Saved-conversation parsing.
//!
//! The backend stores each chatroom as markdown where every message is a line
//! of the form `**[HH:MM:SS] sender**: content`. Only the time of day is kept,
//! so parsed messages are dated today in the local timezone.

use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::message::local_to_utc;
use crate::model::{Message, MessageType};

static LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\*\*\[(\d{2}):(\d{2}):(\d{2})\]\s*(.+?)\*\*:\s*(.+)$").expect("valid transcript regex")
});

static MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[📢🎯]\s*").expect("valid marker regex"));

const SYSTEM_NAMES: [&str; 2] = ["system", "시스템"];

/// Parse a saved conversation into messages dated today.
pub fn parse_transcript(content: &str) -> Vec<Message> {
    parse_transcript_on(content, Local::now().date_naive())
}

/// Parse a saved conversation into messages dated `day` (local time).
pub fn parse_transcript_on(content: &str, day: NaiveDate) -> Vec<Message> {
    let batch = Utc::now().timestamp_millis();
    let mut messages = Vec::new();

    for line in content.lines() {
        let Some(caps) = LINE.captures(line.trim_end_matches('\r')) else {
            continue;
        };
        let Some(timestamp) = local_timestamp(day, &caps[1], &caps[2], &caps[3]) else {
            continue;
        };

        let sender = MARKER.replace(&caps[4], "").trim().to_string();
        let message_type = if SYSTEM_NAMES.contains(&sender.as_str()) {
            MessageType::System
        } else {
            MessageType::Message
        };

        messages.push(Message::new(
            format!("loaded_{}_{}", messages.len(), batch),
            sender,
            caps[5].trim(),
            timestamp,
            message_type,
        ));
    }

    messages
}

fn local_timestamp(day: NaiveDate, h: &str, m: &str, s: &str) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, s.parse().ok()?)?;
    Some(local_to_utc(day.and_time(time)))
}
