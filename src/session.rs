//! A discussion view's lifetime: one store, one realtime connection, one
//! optional status poller, and the command flows that tie them together.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::api::{ApiClient, AutoAction, CommandResponse, StartDiscussionRequest};
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, Connector, EventHandlers};
use crate::dispatch;
use crate::error::ClientError;
use crate::model::{DiscussionState, Message, MessageType, StatusPatch};
use crate::poller::{PollerHandle, StatusPoller, StatusSource};
use crate::store::StoreHandle;

/// Delay before re-reading status after a control command.
pub const STATUS_REFRESH_DELAY: Duration = Duration::from_millis(500);

pub struct DiscussionSession {
    api: ApiClient,
    status_source: Arc<dyn StatusSource>,
    store: StoreHandle,
    connection: ConnectionManager,
    poller: Mutex<Option<PollerHandle>>,
    poll_interval: Duration,
    refresh: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DiscussionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscussionSession")
            .field("base_url", &self.api.base_url().as_str())
            .field("store", &self.store)
            .field("connection", &self.connection)
            .field("polling", &self.is_polling())
            .finish()
    }
}

/// Optimistic status for a successful auto-discussion control command.
pub fn auto_action_patch(action: AutoAction) -> StatusPatch {
    match action {
        AutoAction::Start | AutoAction::Resume => StatusPatch::new()
            .auto_discussion(true)
            .state(DiscussionState::AutoDiscussing),
        AutoAction::Pause => StatusPatch::new()
            .auto_discussion(false)
            .state(DiscussionState::Paused),
        AutoAction::Stop => StatusPatch::new()
            .auto_discussion(false)
            .state(DiscussionState::Ready)
            .intervention_pending(false),
    }
}

/// Local notice shown when the backend could not start the discussion.
pub fn start_placeholder(request: &StartDiscussionRequest) -> Message {
    Message::system_notice(format!(
        "🚀 토론이 시작되었습니다!\n주제: {}\n참석자: {}명",
        request.topic,
        request.participants.len()
    ))
}

impl DiscussionSession {
    /// Open a session: realtime events start flowing into the store at once.
    pub fn open(config: &ClientConfig, connector: Arc<dyn Connector>) -> Result<Self, ClientError> {
        Self::open_with_handlers(config, connector, EventHandlers::new())
    }

    /// Like [`open`](Self::open), with extra observers. Their `on_event`
    /// runs after the event has been applied to the store.
    pub fn open_with_handlers(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        observers: EventHandlers,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let api = ApiClient::new(&config.base_url)?;
        let status_source: Arc<dyn StatusSource> = Arc::new(api.clone());
        let store = StoreHandle::new(config.store_options());
        let connection = ConnectionManager::new(connector, config.connection_options());

        let ws_url = config.ws_url()?;
        connection.connect(ws_url, Self::handlers(&store, observers));

        Ok(Self {
            api,
            status_source,
            store,
            connection,
            poller: Mutex::new(None),
            poll_interval: config.poll_interval(),
            refresh: Mutex::new(None),
        })
    }

    fn handlers(store: &StoreHandle, observers: EventHandlers) -> EventHandlers {
        let events_store = store.clone();
        let (on_connect, on_disconnect, on_error) = (observers.clone(), observers.clone(), observers.clone());
        EventHandlers::new()
            .on_event(move |event| {
                dispatch::apply_event(&events_store, &event);
                observers.emit_event(event);
            })
            .on_connect(move || on_connect.emit_connect())
            .on_disconnect(move |reason| on_disconnect.emit_disconnect(reason))
            .on_error(move |err| {
                tracing::warn!(error = %err, recoverable = err.recoverable, "realtime error");
                on_error.emit_error(err);
            })
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    // Polling

    pub fn is_polling(&self) -> bool {
        self.poller.lock().as_ref().map(PollerHandle::is_running).unwrap_or(false)
    }

    /// Begin reconciling status with the backend; no-op if already polling.
    pub fn start_polling(&self) {
        let mut poller = self.poller.lock();
        if poller.as_ref().map(PollerHandle::is_running).unwrap_or(false) {
            return;
        }
        *poller = Some(StatusPoller::start(
            self.status_source.clone(),
            self.store.clone(),
            self.poll_interval,
        ));
    }

    pub fn stop_polling(&self) {
        let poller = self.poller.lock().take();
        if let Some(mut poller) = poller {
            poller.stop();
        }
    }

    /// Fetch status once and merge it.
    pub async fn refresh_status(&self) -> Result<(), ClientError> {
        let patch = self.status_source.fetch_status().await?;
        self.store.merge_status(&patch);
        Ok(())
    }

    fn schedule_refresh(&self) {
        let source = self.status_source.clone();
        let store = self.store.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(STATUS_REFRESH_DELAY).await;
            match source.fetch_status().await {
                Ok(patch) => store.merge_status(&patch),
                Err(err) => tracing::warn!(error = %err, "status refresh failed"),
            }
        });
        if let Some(previous) = self.refresh.lock().replace(task) {
            previous.abort();
        }
    }

    fn cancel_refresh(&self) {
        if let Some(refresh) = self.refresh.lock().take() {
            refresh.abort();
        }
    }

    // Commands

    /// Start a discussion and its automatic rounds.
    ///
    /// The store flips to auto-discussing before the request goes out. When
    /// the backend refuses, a local placeholder notice is appended and the
    /// error is returned.
    pub async fn start_discussion(&self, request: &StartDiscussionRequest) -> Result<(), ClientError> {
        self.start_polling();
        self.store.merge_status(&auto_action_patch(AutoAction::Start));

        let response = match self.api.start_discussion(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "start discussion failed");
                self.store.add_message(start_placeholder(request));
                return Err(err);
            }
        };
        dispatch::apply_command_response(&self.store, &response);
        tracing::info!(topic = %request.topic, room = ?response.room_id, "discussion started");

        match self.api.auto_discussion(AutoAction::Start).await {
            Ok(auto) => {
                dispatch::apply_command_response(&self.store, &auto);
                self.schedule_refresh();
            }
            Err(err) => tracing::warn!(error = %err, "auto discussion did not start"),
        }
        Ok(())
    }

    /// Echo the message locally, then send it.
    pub async fn send_message(&self, content: &str) -> Result<CommandResponse, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::Rejected {
                endpoint: "/api/send_message".to_string(),
                reason: "message is empty".to_string(),
            });
        }
        self.store.add_message(Message::local(content, MessageType::User));
        let response = self.api.send_message(content).await?;
        dispatch::apply_command_response(&self.store, &response);
        Ok(response)
    }

    /// Echo the question locally, then put it to `expert`.
    pub async fn ask_expert(&self, expert: &str, question: &str) -> Result<CommandResponse, ClientError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ClientError::Rejected {
                endpoint: "/api/ask_expert".to_string(),
                reason: "question is empty".to_string(),
            });
        }
        self.store.add_message(Message::local(
            format!("{expert}에게 질문: {question}"),
            MessageType::ExpertQuestion,
        ));
        let response = self.api.ask_expert(expert, question).await?;
        dispatch::apply_command_response(&self.store, &response);
        Ok(response)
    }

    pub async fn deep_dive(&self, question: &str, focus_area: Option<&str>) -> Result<CommandResponse, ClientError> {
        let response = self.api.deep_dive(question, focus_area).await?;
        dispatch::apply_command_response(&self.store, &response);
        Ok(response)
    }

    pub async fn control_auto(&self, action: AutoAction) -> Result<CommandResponse, ClientError> {
        let response = self.api.auto_discussion(action).await?;
        self.store.merge_status(&auto_action_patch(action));
        dispatch::apply_command_response(&self.store, &response);
        self.schedule_refresh();
        Ok(response)
    }

    pub async fn request_intervention(&self) -> Result<CommandResponse, ClientError> {
        let response = self.api.request_intervention().await?;
        self.store.merge_status(
            &StatusPatch::new()
                .intervention_pending(true)
                .auto_discussion(false)
                .state(DiscussionState::UserIntervention),
        );
        dispatch::apply_command_response(&self.store, &response);
        Ok(response)
    }

    pub async fn get_conclusion(&self) -> Result<CommandResponse, ClientError> {
        let response = self.api.get_conclusion().await?;
        dispatch::apply_command_response(&self.store, &response);
        Ok(response)
    }

    /// Switch to a saved chatroom. False when it is already the current room.
    pub async fn switch_chatroom(&self, room_id: &str) -> Result<bool, ClientError> {
        if self.store.room_id().as_deref() == Some(room_id) {
            return Ok(false);
        }
        let response = self.api.switch_chatroom(room_id).await?;
        dispatch::apply_command_response(&self.store, &response);
        Ok(true)
    }

    /// Leave the discussion: polling stops and the store returns to its initial state.
    pub fn reset(&self) {
        self.stop_polling();
        self.cancel_refresh();
        self.store.reset();
    }

    /// Tear everything down. No handler or timer fires afterwards.
    pub async fn close(mut self) {
        self.stop_polling();
        self.cancel_refresh();
        self.connection.shutdown().await;
    }
}

impl Drop for DiscussionSession {
    fn drop(&mut self) {
        if let Some(refresh) = self.refresh.get_mut().take() {
            refresh.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_action_patches() {
        let start = auto_action_patch(AutoAction::Start);
        assert_eq!(start.auto_discussion_enabled, Some(true));
        assert_eq!(start.discussion_state, Some(DiscussionState::AutoDiscussing));
        assert_eq!(auto_action_patch(AutoAction::Resume), start);

        let pause = auto_action_patch(AutoAction::Pause);
        assert_eq!(pause.discussion_state, Some(DiscussionState::Paused));
        assert_eq!(pause.user_intervention_pending, None);

        let stop = auto_action_patch(AutoAction::Stop);
        assert_eq!(stop.discussion_state, Some(DiscussionState::Ready));
        assert_eq!(stop.user_intervention_pending, Some(false));
    }

    #[test]
    fn test_start_placeholder() {
        let request = StartDiscussionRequest {
            topic: "신제품 출시".into(),
            participants: vec!["김창의".into(), "박매출".into()],
            ..Default::default()
        };
        let notice = start_placeholder(&request);
        assert!(notice.is_system());
        assert_eq!(notice.content, "🚀 토론이 시작되었습니다!\n주제: 신제품 출시\n참석자: 2명");
    }
}
