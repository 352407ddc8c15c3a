//! HTTP command client for the discussion backend.
//!
//! Every command endpoint answers with a JSON object carrying a `success` flag. A
//! non-2xx status is [`ClientError::Command`]; `success: false` is
//! [`ClientError::Rejected`] with the backend's `error` string.

pub mod types;

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;
use url::Url;

pub use types::{
    AddContextRequest, AskExpertRequest, AutoAction, Chatroom, CommandResponse, CreateChatroomRequest,
    DeepDiveRequest, Persona, SearchHit, SearchRequest, SendMessageRequest, StartDiscussionRequest,
    StatusResponse, SwitchChatroomRequest, UpdatePersonaRequest, WebSocketStatus,
};

use crate::error::ClientError;
use crate::model::StatusPatch;
use crate::poller::StatusSource;

/// Default focus for deep-dive analysis ("all areas").
pub const DEFAULT_FOCUS_AREA: &str = "전체";

/// Backend HTTP client
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    client: Client,
}

impl ApiClient {
    /// Create a client for the backend at `base_url` (e.g. `http://localhost:8000`).
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ClientError::Config(format!("invalid base url `{base_url}`: {e}")))?;
        let client = Client::builder()
            .user_agent(concat!("roundtable/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Config(format!("http client: {e}")))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Config(format!("invalid endpoint `{path}`: {e}")))
    }

    /// Endpoint built from raw path segments; each one is percent-encoded.
    fn endpoint_segments(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("base url `{}` cannot take a path", self.base_url)))?
            .clear()
            .extend(segments);
        Ok(url)
    }

    /// Send one request; any 2xx body is returned as raw JSON.
    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Value, ClientError> {
        let path = url.path().to_string();
        tracing::debug!(%method, %url, "backend request");

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(endpoint = %path, status = status.as_u16(), body = %body, "backend command failed");
            return Err(ClientError::Command {
                endpoint: path,
                status: status.as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<CommandResponse, ClientError> {
        let path = url.path().to_string();
        let raw = self.send(method, url, body).await?;
        let parsed: CommandResponse = serde_json::from_value(raw)
            .map_err(|e| ClientError::MalformedPayload(format!("{path}: {e}")))?;
        if !parsed.success {
            let reason = parsed.error.clone().unwrap_or_else(|| "unknown error".to_string());
            return Err(ClientError::Rejected {
                endpoint: path,
                reason,
            });
        }
        Ok(parsed)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<CommandResponse, ClientError> {
        self.call(Method::POST, self.endpoint(path)?, Some(body)).await
    }

    async fn post_empty(&self, path: &str) -> Result<CommandResponse, ClientError> {
        self.call::<Value>(Method::POST, self.endpoint(path)?, None).await
    }

    async fn get(&self, path: &str) -> Result<CommandResponse, ClientError> {
        self.call::<Value>(Method::GET, self.endpoint(path)?, None).await
    }

    fn required<T: for<'de> serde::Deserialize<'de>>(
        response: &CommandResponse,
        path: &str,
        field: &str,
    ) -> Result<T, ClientError> {
        response
            .field(field)
            .ok_or_else(|| ClientError::MalformedPayload(format!("{path}: missing or invalid `{field}`")))
    }

    // Discussion commands

    pub async fn start_discussion(&self, request: &StartDiscussionRequest) -> Result<CommandResponse, ClientError> {
        self.post("/api/start_discussion", request).await
    }

    pub async fn auto_discussion(&self, action: AutoAction) -> Result<CommandResponse, ClientError> {
        self.post_empty(&action.path()).await
    }

    pub async fn request_intervention(&self) -> Result<CommandResponse, ClientError> {
        self.post_empty("/api/request_intervention").await
    }

    pub async fn get_conclusion(&self) -> Result<CommandResponse, ClientError> {
        self.post_empty("/api/get_conclusion").await
    }

    pub async fn send_message(&self, content: &str) -> Result<CommandResponse, ClientError> {
        self.post(
            "/api/send_message",
            &SendMessageRequest {
                content: content.to_string(),
            },
        )
        .await
    }

    pub async fn ask_expert(&self, expert: &str, question: &str) -> Result<CommandResponse, ClientError> {
        self.post(
            "/api/ask_expert",
            &AskExpertRequest {
                expert: expert.to_string(),
                question: question.to_string(),
            },
        )
        .await
    }

    pub async fn deep_dive(&self, question: &str, focus_area: Option<&str>) -> Result<CommandResponse, ClientError> {
        self.post(
            "/api/deep_dive",
            &DeepDiveRequest {
                question: question.to_string(),
                focus_area: focus_area.unwrap_or(DEFAULT_FOCUS_AREA).to_string(),
            },
        )
        .await
    }

    pub async fn switch_chatroom(&self, room_id: &str) -> Result<CommandResponse, ClientError> {
        self.post(
            "/api/switch_chatroom",
            &SwitchChatroomRequest {
                room_id: room_id.to_string(),
            },
        )
        .await
    }

    // Status

    /// Authoritative discussion status. This endpoint carries no `success` flag.
    pub async fn status(&self) -> Result<StatusResponse, ClientError> {
        let path = "/api/status";
        let raw = self.send::<Value>(Method::GET, self.endpoint(path)?, None).await?;
        serde_json::from_value(raw).map_err(|e| ClientError::MalformedPayload(format!("{path}: {e}")))
    }

    pub async fn websocket_status(&self) -> Result<WebSocketStatus, ClientError> {
        let path = "/api/websocket/status";
        let response = self.get(path).await?;
        let raw = serde_json::to_value(&response.extra)
            .map_err(|e| ClientError::MalformedPayload(format!("{path}: {e}")))?;
        serde_json::from_value(raw).map_err(|e| ClientError::MalformedPayload(format!("{path}: {e}")))
    }

    // Personas

    pub async fn personas(&self) -> Result<BTreeMap<String, Persona>, ClientError> {
        let path = "/api/personas";
        let response = self.get(path).await?;
        Self::required(&response, path, "personas")
    }

    pub async fn update_persona(&self, update: &UpdatePersonaRequest) -> Result<CommandResponse, ClientError> {
        self.post("/api/personas/update", update).await
    }

    pub async fn reset_personas(&self) -> Result<CommandResponse, ClientError> {
        self.post_empty("/api/personas/reset").await
    }

    // Memory

    pub async fn chatrooms(&self) -> Result<Vec<Chatroom>, ClientError> {
        let path = "/api/memory/chatrooms";
        let response = self.get(path).await?;
        Self::required(&response, path, "chatrooms")
    }

    /// Returns the new room id.
    pub async fn create_chatroom(&self, room_name: &str) -> Result<String, ClientError> {
        let path = "/api/memory/create_chatroom";
        let response = self
            .post(
                path,
                &CreateChatroomRequest {
                    room_name: room_name.to_string(),
                },
            )
            .await?;
        response
            .room_id
            .ok_or_else(|| ClientError::MalformedPayload(format!("{path}: missing `room_id`")))
    }

    pub async fn add_context(&self, request: &AddContextRequest) -> Result<CommandResponse, ClientError> {
        self.post("/api/memory/add_context", request).await
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, ClientError> {
        let path = "/api/memory/search";
        let response = self.post(path, request).await?;
        Self::required(&response, path, "results")
    }

    pub async fn memory_stats(&self) -> Result<Value, ClientError> {
        let path = "/api/memory/stats";
        let response = self.get(path).await?;
        Self::required(&response, path, "stats")
    }

    pub async fn chatroom_conversation(&self, room_id: &str) -> Result<String, ClientError> {
        let url = self.endpoint_segments(&["api", "memory", "chatroom", room_id, "conversation"])?;
        let path = url.path().to_string();
        let response = self.call::<Value>(Method::GET, url, None).await?;
        Self::required(&response, &path, "content")
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self) -> Result<StatusPatch, ClientError> {
        Ok(self.status().await?.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let api = ApiClient::new("http://localhost:8000").unwrap();
        assert_eq!(
            api.endpoint("/api/status").unwrap().as_str(),
            "http://localhost:8000/api/status"
        );
        assert_eq!(
            api.endpoint(&AutoAction::Stop.path()).unwrap().path(),
            "/api/stop_auto_discussion"
        );
    }

    #[test]
    fn test_room_id_stays_one_path_segment() {
        let api = ApiClient::new("http://localhost:8000/?token=x#top").unwrap();
        let url = api
            .endpoint_segments(&["api", "memory", "chatroom", "a/b?c#d", "conversation"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/memory/chatroom/a%2Fb%3Fc%23d/conversation"
        );
        assert_eq!(url.path_segments().unwrap().count(), 5);
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(ApiClient::new("not a url"), Err(ClientError::Config(_))));
    }
}
