//! Error Handling and Reconnect Policy
//!
//! Typed client errors, their categories, user-facing diagnostics, and the
//! exponential backoff schedule the realtime connection follows.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the client core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// Connection failed to open, dropped, or an HTTP request never completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound payload could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The backend answered a command with a non-success HTTP status.
    #[error("{endpoint} failed with HTTP {status}")]
    Command { endpoint: String, status: u16 },

    /// The backend answered `success: false`.
    #[error("{endpoint} rejected: {reason}")]
    Rejected { endpoint: String, reason: String },

    /// Automatic reconnection gave up.
    #[error("could not reach the server after {attempts} attempts; reconnect manually or check the backend")]
    ReconnectExhausted { attempts: u32 },

    /// The realtime connection is not open.
    #[error("realtime connection is not open")]
    NotConnected,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ClientError::Transport(_) | ClientError::NotConnected => ErrorCategory::Network,
            ClientError::ReconnectExhausted { .. } => ErrorCategory::Exhausted,
            ClientError::MalformedPayload(_) => ErrorCategory::Protocol,
            ClientError::Command { .. } | ClientError::Rejected { .. } => ErrorCategory::Command,
            ClientError::Config(_) => ErrorCategory::Configuration,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        match (err.status(), err.url()) {
            (Some(status), Some(url)) => ClientError::Command {
                endpoint: url.path().to_string(),
                status: status.as_u16(),
            },
            _ if err.is_decode() => ClientError::MalformedPayload(err.to_string()),
            _ => ClientError::Transport(err.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// Categorized error types for better handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (retryable)
    Network,

    /// Retries exhausted; needs explicit user action
    Exhausted,

    /// Undecodable payloads (dropped, not retried)
    Protocol,

    /// Backend refused or failed a command (transient, user-visible)
    Command,

    /// Configuration errors (not retryable)
    Configuration,
}

impl ErrorCategory {
    /// Check if this error category is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network | ErrorCategory::Command)
    }
}

/// Error with context and suggestions for terminal output
#[derive(Debug)]
pub struct Diagnostic {
    pub error: anyhow::Error,
    pub category: Option<ErrorCategory>,
    pub context: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn new(error: anyhow::Error) -> Self {
        let category = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<ClientError>())
            .map(ClientError::category);
        let (context, suggestions) = context_and_suggestions(category);

        Self {
            error,
            category,
            context,
            suggestions,
        }
    }

    /// Render the error with all context
    pub fn display(&self) -> String {
        let mut output = format!("❌ Error: {:#}\n", self.error);

        if !self.context.is_empty() {
            output.push_str("\n📋 Context:\n");
            for ctx in &self.context {
                output.push_str(&format!("   • {}\n", ctx));
            }
        }

        if !self.suggestions.is_empty() {
            output.push_str("\n💡 Suggestions:\n");
            for suggestion in &self.suggestions {
                output.push_str(&format!("   • {}\n", suggestion));
            }
        }

        output
    }
}

fn context_and_suggestions(category: Option<ErrorCategory>) -> (Vec<String>, Vec<String>) {
    let mut context = Vec::new();
    let mut suggestions = Vec::new();

    match category {
        Some(ErrorCategory::Network) => {
            context.push("Could not talk to the discussion backend".to_string());
            suggestions.push("Check that the backend is running".to_string());
            suggestions.push("Verify --base-url / ROUNDTABLE_BASE_URL".to_string());
        }
        Some(ErrorCategory::Exhausted) => {
            context.push("Automatic reconnection stopped".to_string());
            suggestions.push("Reconnect manually once the backend is back".to_string());
        }
        Some(ErrorCategory::Protocol) => {
            context.push("The backend sent a payload this client cannot read".to_string());
            suggestions.push("Check that client and backend versions match".to_string());
        }
        Some(ErrorCategory::Command) => {
            context.push("The backend did not accept the command".to_string());
            suggestions.push("Make sure a discussion has been started".to_string());
            suggestions.push("Try again in a few moments".to_string());
        }
        Some(ErrorCategory::Configuration) => {
            context.push("Configuration error detected".to_string());
            suggestions.push("Review your configuration file".to_string());
            suggestions.push("Check ROUNDTABLE_* environment variables".to_string());
        }
        None => {
            suggestions.push("Run with RUST_LOG=roundtable=debug for more details".to_string());
        }
    }

    (context, suggestions)
}

/// Reconnect schedule for the realtime connection
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Maximum number of automatic reconnect attempts
    pub max_attempts: u32,

    /// Delay before the first automatic attempt
    pub initial_delay: Duration,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(3000),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect automatically
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Delay before the automatic attempt that follows `attempt` earlier ones.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay = (initial * self.backoff_multiplier.powi(exponent)).min(max);
        Duration::from_millis(delay as u64)
    }
}
