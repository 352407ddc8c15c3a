//! Realtime wire frames.
//!
//! Every frame on the socket is a JSON envelope `{"type": <kind>, "data": <payload>}`.
//! Inbound frames are decoded into [`ServerEvent`]; the only outbound frame the
//! client originates on its own is the heartbeat [`ClientFrame::Ping`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::Message;
use crate::error::ClientError;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Payload of a `chatroom_switched` event (also returned by `/api/switch_chatroom`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatroomSwitch {
    pub room_id: String,
    #[serde(default)]
    pub conversation_content: Option<String>,
    #[serde(default)]
    pub previous_room_id: Option<String>,
    #[serde(default)]
    pub room_info: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct DiscussionStartedData {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    room_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TypingStartData {
    speaker: String,
}

/// A decoded inbound realtime event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(Message),
    DiscussionStarted {
        messages: Vec<Message>,
        room_id: Option<String>,
    },
    TypingStart {
        speaker: String,
    },
    TypingStop,
    UserInterventionRequested,
    ChatroomSwitched(ChatroomSwitch),
    PersonaUpdated(Value),
    PersonasReset(Value),
    Ping,
    Pong,
    /// Any kind this client does not know; delivered untouched.
    Other {
        kind: String,
        data: Value,
    },
}

impl ServerEvent {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| ClientError::MalformedPayload(format!("invalid envelope: {e}")))?;
        Self::from_parts(envelope.kind, envelope.data)
    }

    fn from_parts(kind: String, data: Value) -> Result<Self, ClientError> {
        fn payload<T: for<'de> Deserialize<'de>>(kind: &str, data: Value) -> Result<T, ClientError> {
            serde_json::from_value(data)
                .map_err(|e| ClientError::MalformedPayload(format!("invalid `{kind}` payload: {e}")))
        }

        let event = match kind.as_str() {
            "message" => ServerEvent::Message(payload(&kind, data)?),
            "discussion_started" => {
                let started: DiscussionStartedData = payload(&kind, data)?;
                ServerEvent::DiscussionStarted {
                    messages: started.messages,
                    room_id: started.room_id,
                }
            }
            "typing_start" => {
                let typing: TypingStartData = payload(&kind, data)?;
                ServerEvent::TypingStart {
                    speaker: typing.speaker,
                }
            }
            "typing_stop" => ServerEvent::TypingStop,
            "user_intervention_requested" => ServerEvent::UserInterventionRequested,
            "chatroom_switched" => ServerEvent::ChatroomSwitched(payload(&kind, data)?),
            "persona_updated" => ServerEvent::PersonaUpdated(data),
            "personas_reset" => ServerEvent::PersonasReset(data),
            "ping" => ServerEvent::Ping,
            "pong" => ServerEvent::Pong,
            _ => ServerEvent::Other { kind, data },
        };
        Ok(event)
    }

    pub fn kind(&self) -> &str {
        match self {
            ServerEvent::Message(_) => "message",
            ServerEvent::DiscussionStarted { .. } => "discussion_started",
            ServerEvent::TypingStart { .. } => "typing_start",
            ServerEvent::TypingStop => "typing_stop",
            ServerEvent::UserInterventionRequested => "user_intervention_requested",
            ServerEvent::ChatroomSwitched(_) => "chatroom_switched",
            ServerEvent::PersonaUpdated(_) => "persona_updated",
            ServerEvent::PersonasReset(_) => "personas_reset",
            ServerEvent::Ping => "ping",
            ServerEvent::Pong => "pong",
            ServerEvent::Other { kind, .. } => kind,
        }
    }

    /// Heartbeat frames are consumed by the connection and never reach handlers.
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, ServerEvent::Ping | ServerEvent::Pong)
    }
}

/// Frames the client sends on its own initiative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
}

impl ClientFrame {
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"ping"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_message_event() {
        let text = r#"{"type":"message","data":{"id":"m1","sender":"CFO","content":"hi","timestamp":"2024-05-01T10:00:00","message_type":"response"}}"#;
        match ServerEvent::parse(text).unwrap() {
            ServerEvent::Message(msg) => {
                assert_eq!(msg.id, "m1");
                assert_eq!(msg.sender, "CFO");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_control_events() {
        assert_eq!(
            ServerEvent::parse(r#"{"type":"typing_start","data":{"speaker":"CTO"}}"#).unwrap(),
            ServerEvent::TypingStart { speaker: "CTO".into() }
        );
        assert_eq!(
            ServerEvent::parse(r#"{"type":"typing_stop","data":{}}"#).unwrap(),
            ServerEvent::TypingStop
        );
        assert_eq!(
            ServerEvent::parse(r#"{"type":"user_intervention_requested","data":{}}"#).unwrap(),
            ServerEvent::UserInterventionRequested
        );
        let pong = ServerEvent::parse(r#"{"type":"pong","data":{"timestamp":"2024-05-01T10:00:00"}}"#).unwrap();
        assert!(pong.is_heartbeat());
    }

    #[test]
    fn test_parse_discussion_started_and_switch() {
        let text = r#"{"type":"discussion_started","data":{"success":true,"room_id":"r1","messages":[
            {"id":"a","sender":"시스템","content":"start","timestamp":"2024-05-01T10:00:00","message_type":"system"},
            {"id":"b","sender":"CFO","content":"opinion","timestamp":"2024-05-01T10:00:01","message_type":"message"}
        ]}}"#;
        match ServerEvent::parse(text).unwrap() {
            ServerEvent::DiscussionStarted { messages, room_id } => {
                assert_eq!(messages.len(), 2);
                assert_eq!(room_id.as_deref(), Some("r1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let text = r#"{"type":"chatroom_switched","data":{"room_id":"r2","conversation_content":"","previous_room_id":"r1"}}"#;
        match ServerEvent::parse(text).unwrap() {
            ServerEvent::ChatroomSwitched(switch) => {
                assert_eq!(switch.room_id, "r2");
                assert_eq!(switch.previous_room_id.as_deref(), Some("r1"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            ServerEvent::parse("not json"),
            Err(ClientError::MalformedPayload(_))
        ));
        assert!(matches!(
            ServerEvent::parse(r#"{"type":"typing_start","data":{}}"#),
            Err(ClientError::MalformedPayload(_))
        ));
        let other = ServerEvent::parse(r#"{"type":"company_info"}"#).unwrap();
        assert_eq!(other.kind(), "company_info");
    }

    #[test]
    fn test_ping_frame() {
        assert_eq!(ClientFrame::Ping.to_text(), r#"{"type":"ping"}"#);
    }
}
