use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ChatroomSwitch, Message, StatusPatch};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StartDiscussionRequest {
    pub topic: String,
    pub participants: Vec<String>,
    #[serde(default)]
    pub company_info: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskExpertRequest {
    pub expert: String,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeepDiveRequest {
    pub question: String,
    pub focus_area: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchChatroomRequest {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateChatroomRequest {
    pub room_name: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AddContextRequest {
    pub context: String,
    pub agent_name: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub agent_name: Option<String>,
    pub room_id: Option<String>,
    pub top_k: usize,
}

impl SearchRequest {
    pub fn common(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            agent_name: None,
            room_id: None,
            top_k: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UpdatePersonaRequest {
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backstory: Option<String>,
}

/// Auto-discussion control actions; each maps to `/api/{action}_auto_discussion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoAction {
    Start,
    Pause,
    Resume,
    Stop,
}

impl AutoAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoAction::Start => "start",
            AutoAction::Pause => "pause",
            AutoAction::Resume => "resume",
            AutoAction::Stop => "stop",
        }
    }

    pub fn path(&self) -> String {
        format!("/api/{}_auto_discussion", self.as_str())
    }
}

impl std::str::FromStr for AutoAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(AutoAction::Start),
            "pause" => Ok(AutoAction::Pause),
            "resume" => Ok(AutoAction::Resume),
            "stop" => Ok(AutoAction::Stop),
            other => Err(format!("unknown auto-discussion action: {other}")),
        }
    }
}

/// Common envelope of every command response.
///
/// `message` is kept raw because persona endpoints answer with a plain
/// string there while discussion endpoints answer with a chat message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub conversation_content: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CommandResponse {
    /// The chat message carried in `message`, if it is one.
    pub fn chat_message(&self) -> Option<Message> {
        self.message
            .as_ref()
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }

    /// The notice carried in `message`, if it is plain text.
    pub fn notice(&self) -> Option<&str> {
        self.message.as_ref().and_then(Value::as_str)
    }

    /// Present when the response describes a chatroom switch.
    pub fn chatroom_switch(&self) -> Option<ChatroomSwitch> {
        let room_id = self.room_id.clone()?;
        self.conversation_content.as_ref()?;
        Some(ChatroomSwitch {
            room_id,
            conversation_content: self.conversation_content.clone(),
            previous_room_id: None,
            room_info: self.extra.get("room_info").cloned(),
        })
    }

    /// Decode an extra field such as `chatrooms` or `stats`.
    pub fn field<T: for<'de> Deserialize<'de>>(&self, name: &str) -> Option<T> {
        self.extra
            .get(name)
            .and_then(|raw| serde_json::from_value(raw.clone()).ok())
    }
}

/// `/api/status` payload: the status patch plus connection bookkeeping.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub discussion_started: bool,
    #[serde(default)]
    pub current_room_id: Option<String>,
    #[serde(default)]
    pub websocket_connected: bool,
    #[serde(default)]
    pub connection_count: u64,
    #[serde(flatten)]
    pub patch: StatusPatch,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct WebSocketStatus {
    #[serde(default)]
    pub websocket_connected: bool,
    #[serde(default)]
    pub connection_count: u64,
    #[serde(default)]
    pub active_connections: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Chatroom {
    pub id: String,
    pub room_name: String,
    pub topic: String,
    pub created_at: Option<String>,
    pub last_updated: Option<String>,
    pub message_count: u64,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchHit {
    pub text: String,
    pub metadata: Value,
    pub similarity_score: f64,
    pub rank: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiscussionState;

    #[test]
    fn test_command_response_with_chat_message() {
        let raw = r#"{"success": true, "message": {"id":"x","sender":"진행자","content":"일시정지","timestamp":"2024-05-01T10:00:00","message_type":"system"}}"#;
        let resp: CommandResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.success);
        assert_eq!(resp.chat_message().unwrap().sender, "진행자");
        assert_eq!(resp.notice(), None);
    }

    #[test]
    fn test_command_response_with_notice_and_extras() {
        let raw = r#"{"success": true, "message": "모든 페르소나가 기본값으로 리셋되었습니다.", "chatrooms": [{"id": "r1", "room_name": "토론: AI", "message_count": 4}]}"#;
        let resp: CommandResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.chat_message().is_none());
        assert!(resp.notice().unwrap().contains("리셋"));
        let rooms: Vec<Chatroom> = resp.field("chatrooms").unwrap();
        assert_eq!(rooms[0].id, "r1");
        assert_eq!(rooms[0].message_count, 4);
    }

    #[test]
    fn test_switch_detection() {
        let resp: CommandResponse =
            serde_json::from_str(r#"{"success": true, "room_id": "r1"}"#).unwrap();
        assert!(resp.chatroom_switch().is_none());

        let resp: CommandResponse = serde_json::from_str(
            r#"{"success": true, "room_id": "r2", "conversation_content": "", "room_info": {"id": "r2"}}"#,
        )
        .unwrap();
        let switch = resp.chatroom_switch().unwrap();
        assert_eq!(switch.room_id, "r2");
        assert!(switch.room_info.is_some());
    }

    #[test]
    fn test_status_response_flattens_patch() {
        let raw = r#"{"discussion_started": true, "discussion_state": "paused", "total_messages": 3, "websocket_connected": true, "connection_count": 2}"#;
        let status: StatusResponse = serde_json::from_str(raw).unwrap();
        assert!(status.discussion_started);
        assert_eq!(status.connection_count, 2);
        assert_eq!(status.patch.discussion_state, Some(DiscussionState::Paused));
        assert_eq!(status.patch.total_messages, Some(3));
    }

    #[test]
    fn test_auto_action_paths() {
        assert_eq!(AutoAction::Pause.path(), "/api/pause_auto_discussion");
        assert_eq!("resume".parse::<AutoAction>().unwrap(), AutoAction::Resume);
        assert!("restart".parse::<AutoAction>().is_err());
    }
}
