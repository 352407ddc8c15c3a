//! Terminal rendering of store contents.

use chrono::Local;
use colored::*;

use crate::api::{Chatroom, Persona, SearchHit};
use crate::connection::{ConnectionPhase, ConnectionState};
use crate::model::{DiscussionState, Message, MessageType, Status};

pub fn message(msg: &Message) -> String {
    let time = msg.timestamp.with_timezone(&Local).format("%H:%M:%S").to_string();
    let header = match msg.message_type {
        MessageType::System => format!("📢 {}", msg.sender).yellow().bold(),
        MessageType::User => format!("🙋 {}", msg.sender).green().bold(),
        MessageType::ExpertQuestion => format!("❓ {}", msg.sender).green().bold(),
        MessageType::Conclusion => format!("🏁 {}", msg.sender).magenta().bold(),
        MessageType::Response => format!("💬 {}", msg.sender).cyan().bold(),
        MessageType::Message => format!("🎯 {}", msg.sender).bright_white().bold(),
    };
    let body = if msg.message_type == MessageType::System {
        msg.content.dimmed().to_string()
    } else {
        msg.content.clone()
    };
    let indented = body.replace('\n', "\n    ");
    format!("{} {}\n    {}", format!("[{time}]").bright_black(), header, indented)
}

pub fn state_label(state: DiscussionState) -> ColoredString {
    match state {
        DiscussionState::Ready => "ready".normal(),
        DiscussionState::AutoDiscussing => "auto-discussing".green(),
        DiscussionState::Paused => "paused".yellow(),
        DiscussionState::UserIntervention => "waiting for you".bright_magenta(),
    }
}

pub fn status(status: &Status, room_id: Option<&str>) -> String {
    let mut out = format!(
        "{} {}  {} {}  {} {}  {} {}",
        "State:".bright_black(),
        state_label(status.discussion_state),
        "Auto:".bright_black(),
        if status.auto_discussion_enabled { "on".green() } else { "off".red() },
        "Rounds:".bright_black(),
        status.discussion_rounds,
        "Messages:".bright_black(),
        status.total_messages,
    );
    if status.user_intervention_pending {
        out.push_str(&format!("  {}", "✋ intervention pending".bright_magenta()));
    }
    if let Some(room) = room_id {
        out.push_str(&format!("\n{} {}", "Room:".bright_black(), room.bright_yellow()));
    }
    if !status.current_speaker.name.is_empty() {
        out.push_str(&format!("\n{} {}", "Speaker:".bright_black(), status.current_speaker.name));
    }
    if !status.active_participants.is_empty() {
        let names: Vec<_> = status
            .active_participants
            .iter()
            .map(|p| format!("{} {}", p.avatar, p.name).trim().to_string())
            .collect();
        out.push_str(&format!("\n{} {}", "Participants:".bright_black(), names.join(", ")));
    }
    out
}

pub fn typing(status: &Status) -> Option<String> {
    let speaker = &status.current_speaker;
    (speaker.is_typing && !speaker.name.is_empty())
        .then(|| format!("✍  {} is typing...", speaker.name).italic().bright_black().to_string())
}

pub fn connection(state: &ConnectionState) -> String {
    let label = match state.phase {
        ConnectionPhase::Open => "● connected".green(),
        ConnectionPhase::Connecting => "◌ connecting".yellow(),
        ConnectionPhase::Closed => format!("○ reconnecting (attempt {})", state.reconnect_attempts).yellow(),
        ConnectionPhase::Exhausted => "✗ disconnected, reconnect manually".red().bold(),
        ConnectionPhase::Stopped => "○ offline".red(),
        ConnectionPhase::Idle => "○ idle".normal(),
    };
    match (&state.last_error, state.phase) {
        (Some(err), ConnectionPhase::Closed | ConnectionPhase::Exhausted) => {
            format!("{} {}", label, format!("({err})").bright_black())
        }
        _ => label.to_string(),
    }
}

pub fn chatroom(room: &Chatroom, current: Option<&str>) -> String {
    let marker = if current == Some(room.id.as_str()) { "▶".green() } else { " ".normal() };
    let title = if room.topic.is_empty() { &room.room_name } else { &room.topic };
    format!(
        "{} {}  {}  {}",
        marker,
        room.id.bright_yellow(),
        title,
        format!("({} messages)", room.message_count).bright_black()
    )
}

pub fn persona(name: &str, persona: &Persona) -> String {
    format!(
        "{}\n  {} {}\n  {} {}\n  {} {}",
        name.cyan().bold(),
        "role:".bright_black(),
        persona.role,
        "goal:".bright_black(),
        persona.goal,
        "backstory:".bright_black(),
        persona.backstory
    )
}

pub fn search_hit(hit: &SearchHit) -> String {
    format!(
        "{} {} {}",
        format!("#{}", hit.rank).bright_black(),
        format!("[{:.3}]", hit.similarity_score).cyan(),
        hit.text
    )
}
