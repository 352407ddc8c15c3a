//! Translation of inbound events and command responses into store operations.

pub mod transcript;

pub use transcript::{parse_transcript, parse_transcript_on};

use crate::api::types::CommandResponse;
use crate::model::{ChatroomSwitch, CurrentSpeaker, DiscussionState, ServerEvent, Status};
use crate::store::StoreHandle;

/// Apply one realtime event to the store.
pub fn apply_event(store: &StoreHandle, event: &ServerEvent) {
    match event {
        ServerEvent::Message(message) => {
            store.add_message(message.clone());
        }
        ServerEvent::DiscussionStarted { messages, room_id } => {
            if room_id.is_some() {
                store.set_room(room_id.clone());
            }
            store.add_messages(messages.iter().cloned());
        }
        ServerEvent::TypingStart { speaker } => {
            let speaker = speaker.clone();
            store.update_status(move |prev| Status {
                current_speaker: CurrentSpeaker::typing(speaker),
                ..prev.clone()
            });
        }
        ServerEvent::TypingStop => {
            store.update_status(|prev| Status {
                current_speaker: CurrentSpeaker {
                    is_typing: false,
                    ..prev.current_speaker.clone()
                },
                ..prev.clone()
            });
        }
        ServerEvent::UserInterventionRequested => {
            store.update_status(|prev| Status {
                user_intervention_pending: true,
                ..prev.clone()
            });
        }
        ServerEvent::ChatroomSwitched(switch) => apply_chatroom_switch(store, switch),
        ServerEvent::PersonaUpdated(data) => {
            tracing::info!(agent = %data.get("agent_name").and_then(|v| v.as_str()).unwrap_or("?"), "persona updated");
        }
        ServerEvent::PersonasReset(_) => {
            tracing::info!("personas reset to defaults");
        }
        ServerEvent::Ping | ServerEvent::Pong => {}
        ServerEvent::Other { kind, .. } => {
            tracing::debug!(kind = %kind, "ignoring unhandled event");
        }
    }
}

/// Replace the log with the target room's transcript and return to `ready`.
pub fn apply_chatroom_switch(store: &StoreHandle, switch: &ChatroomSwitch) {
    tracing::info!(room = %switch.room_id, previous = ?switch.previous_room_id, "chatroom switched");

    store.clear_messages();
    store.set_room(Some(switch.room_id.clone()));

    if let Some(content) = switch.conversation_content.as_deref() {
        let loaded = store.add_messages(parse_transcript(content));
        tracing::debug!(loaded, "transcript loaded");
    }

    store.update_status(|prev| Status {
        auto_discussion_enabled: false,
        user_intervention_pending: false,
        discussion_state: DiscussionState::Ready,
        current_speaker: CurrentSpeaker::default(),
        ..prev.clone()
    });
}

/// Apply the payload of a successful command response, exactly as the
/// equivalent realtime events would be.
pub fn apply_command_response(store: &StoreHandle, response: &CommandResponse) {
    if let Some(switch) = response.chatroom_switch() {
        apply_chatroom_switch(store, &switch);
        return;
    }
    if response.room_id.is_some() {
        store.set_room(response.room_id.clone());
    }
    store.add_messages(response.messages.iter().cloned());
    if let Some(message) = response.chat_message() {
        store.add_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Message, MessageType};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn msg(id: &str, sender: &str, content: &str) -> Message {
        Message::new(id, sender, content, Utc::now(), MessageType::Message)
    }

    #[test]
    fn test_message_events_append() {
        let store = StoreHandle::default();
        let now = Utc::now();
        apply_event(&store, &ServerEvent::Message(Message::new("m1", "system", "hi", now, MessageType::System)));
        apply_event(
            &store,
            &ServerEvent::Message(Message::new("m2", "system", "hi", now + Duration::milliseconds(500), MessageType::System)),
        );
        assert_eq!(store.messages().len(), 1);
        assert_eq!(store.status().total_messages, 1);
    }

    #[test]
    fn test_discussion_started_keeps_order_and_room() {
        let store = StoreHandle::default();
        apply_event(
            &store,
            &ServerEvent::DiscussionStarted {
                messages: vec![msg("a", "시스템", "start"), msg("b", "CFO", "first"), msg("c", "CTO", "second")],
                room_id: Some("room-1".into()),
            },
        );
        let ids: Vec<_> = store.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.room_id().as_deref(), Some("room-1"));
    }

    #[test]
    fn test_typing_indicator() {
        let store = StoreHandle::default();
        apply_event(&store, &ServerEvent::TypingStart { speaker: "CFO".into() });
        assert_eq!(store.status().current_speaker, CurrentSpeaker::typing("CFO"));

        apply_event(&store, &ServerEvent::TypingStop);
        let speaker = store.status().current_speaker;
        assert_eq!(speaker.name, "CFO");
        assert!(!speaker.is_typing);
    }

    #[test]
    fn test_intervention_requested() {
        let store = StoreHandle::default();
        apply_event(&store, &ServerEvent::UserInterventionRequested);
        assert!(store.status().user_intervention_pending);
    }

    #[test]
    fn test_chatroom_switch_loads_transcript() {
        let store = StoreHandle::default();
        store.add_message(msg("old", "CFO", "stale"));
        store.update_status(|prev| Status {
            auto_discussion_enabled: true,
            user_intervention_pending: true,
            discussion_state: DiscussionState::Paused,
            current_speaker: CurrentSpeaker::typing("CFO"),
            ..prev.clone()
        });

        let event = ServerEvent::parse(
            &json!({
                "type": "chatroom_switched",
                "data": {"room_id": "r2", "conversation_content": "**[10:00:01] 시스템**: 안녕하세요"}
            })
            .to_string(),
        )
        .unwrap();
        apply_event(&store, &event);

        let messages = store.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender, "시스템");
        assert_eq!(messages[0].message_type, MessageType::System);
        assert_eq!(messages[0].content, "안녕하세요");
        assert_eq!(store.room_id().as_deref(), Some("r2"));

        let status = store.status();
        assert!(!status.auto_discussion_enabled);
        assert!(!status.user_intervention_pending);
        assert_eq!(status.discussion_state, DiscussionState::Ready);
        assert_eq!(status.current_speaker, CurrentSpeaker::default());
    }

    #[test]
    fn test_informational_events_leave_store_alone() {
        let store = StoreHandle::default();
        let before = store.snapshot();
        apply_event(&store, &ServerEvent::PersonaUpdated(json!({"agent_name": "CFO"})));
        apply_event(&store, &ServerEvent::PersonasReset(json!({})));
        apply_event(&store, &ServerEvent::Pong);
        apply_event(&store, &ServerEvent::Other { kind: "company_info".into(), data: json!({}) });
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_command_response_applied_like_events() {
        let store = StoreHandle::default();
        let response: CommandResponse = serde_json::from_value(json!({
            "success": true,
            "room_id": "room-9",
            "messages": [
                {"id": "a", "sender": "시스템", "content": "start", "timestamp": "2024-05-01T10:00:00", "message_type": "system"},
                {"id": "b", "sender": "CFO", "content": "hello", "timestamp": "2024-05-01T10:00:02"}
            ],
            "message": {"id": "c", "sender": "CTO", "content": "me too", "timestamp": "2024-05-01T10:00:03"}
        }))
        .unwrap();
        apply_command_response(&store, &response);
        // replaying the same response changes nothing
        apply_command_response(&store, &response);

        let ids: Vec<_> = store.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.room_id().as_deref(), Some("room-9"));
        assert_eq!(store.status().total_messages, 3);
    }

    #[test]
    fn test_switch_response_replaces_log() {
        let store = StoreHandle::default();
        store.add_message(msg("old", "CFO", "stale"));
        let response: CommandResponse = serde_json::from_value(json!({
            "success": true,
            "room_id": "r3",
            "conversation_content": "**[09:00:00] 🎯 CTO**: 재개합니다\n**[09:00:05] 📢 시스템**: ok"
        }))
        .unwrap();
        apply_command_response(&store, &response);

        let senders: Vec<_> = store.messages().into_iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec!["CTO", "시스템"]);
        assert_eq!(store.room_id().as_deref(), Some("r3"));
    }
}
