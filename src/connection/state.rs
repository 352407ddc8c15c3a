use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::handlers::ConnectionError;
use crate::error::ReconnectPolicy;

/// Position of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Nothing requested yet.
    #[default]
    Idle,
    Connecting,
    Open,
    /// Dropped; a retry or manual reopen is pending.
    Closed,
    /// Automatic retries used up; only a manual reconnect leaves this phase.
    Exhausted,
    /// Auto-reconnect disabled or torn down.
    Stopped,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionPhase::Idle => "idle",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Open => "open",
            ConnectionPhase::Closed => "closed",
            ConnectionPhase::Exhausted => "exhausted",
            ConnectionPhase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Observable connection state, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    pub is_connected: bool,
    pub reconnect_attempts: u32,
    pub should_reconnect: bool,
    pub last_error: Option<ConnectionError>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Idle,
            is_connected: false,
            reconnect_attempts: 0,
            should_reconnect: true,
            last_error: None,
        }
    }
}

/// Connection timing.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionOptions {
    /// Interval between application-level `ping` frames while open.
    pub heartbeat_interval: Duration,
    /// Delay between a manual reconnect request and the fresh open.
    pub manual_reconnect_delay: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            manual_reconnect_delay: Duration::from_millis(100),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
