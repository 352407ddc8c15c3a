//! # Roundtable - Realtime Discussion Client
//!
//! Client core for a multi-agent roundtable discussion backend.
//!
//! ## Features
//!
//! - **Realtime connection**: WebSocket with heartbeat, bounded exponential
//!   backoff, manual reconnect and clean teardown
//! - **Discussion store**: append-only message log with duplicate suppression
//!   and merge-only status updates
//! - **Status poller**: periodic reconciliation against the backend
//! - **Typed command client** for every backend endpoint
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roundtable::{ClientConfig, DiscussionSession, StartDiscussionRequest, WsConnector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::load(None)?;
//!     let session = DiscussionSession::open(&config, Arc::new(WsConnector))?;
//!
//!     let mut changes = session.store().subscribe();
//!     session
//!         .start_discussion(&StartDiscussionRequest {
//!             topic: "신제품 출시 전략".into(),
//!             participants: vec!["김창의".into(), "박매출".into()],
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     while let Ok(change) = changes.recv().await {
//!         println!("{change:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod model;
pub mod poller;
pub mod render;
pub mod session;
pub mod store;

// Re-export main types for library consumers
pub use api::{ApiClient, AutoAction, CommandResponse, StartDiscussionRequest};
pub use config::ClientConfig;
pub use connection::{
    ConnectionError, ConnectionManager, ConnectionOptions, ConnectionPhase, ConnectionState, Connector,
    EventHandlers, WsConnector,
};
pub use error::{ClientError, Diagnostic, ErrorCategory, ReconnectPolicy};
pub use model::{Message, MessageType, ServerEvent, Status, StatusPatch};
pub use poller::{PollerHandle, StatusPoller, StatusSource};
pub use session::DiscussionSession;
pub use store::{StoreChange, StoreHandle, StoreOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
