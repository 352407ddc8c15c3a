//! Client configuration.
//!
//! Layers, lowest precedence first: built-in defaults, an optional TOML
//! file, environment variables (a `.env` file is honored), and finally
//! command-line overrides applied by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::connection::ConnectionOptions;
use crate::error::{ClientError, ReconnectPolicy};
use crate::store::StoreOptions;

pub const ENV_BASE_URL: &str = "ROUNDTABLE_BASE_URL";
pub const ENV_WS_URL: &str = "ROUNDTABLE_WS_URL";
pub const ENV_LOG_DIR: &str = "ROUNDTABLE_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend HTTP root, e.g. `http://localhost:8000`.
    pub base_url: String,
    /// Realtime endpoint; derived from `base_url` when unset.
    pub ws_url: Option<String>,
    pub heartbeat_interval_ms: u64,
    pub manual_reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub duplicate_window_ms: u64,
    pub reconnect: ReconnectConfig,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 3000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_url: None,
            heartbeat_interval_ms: 30_000,
            manual_reconnect_delay_ms: 100,
            poll_interval_ms: 3000,
            duplicate_window_ms: 1000,
            reconnect: ReconnectConfig::default(),
            log_dir: None,
        }
    }
}

impl ClientConfig {
    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| ClientError::Config(format!("parsing {}: {e}", path.display())))
    }

    /// Defaults or `path`, then environment overrides, validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        dotenvy::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = base;
        }
        if let Some(ws) = lookup(ENV_WS_URL).filter(|v| !v.is_empty()) {
            self.ws_url = Some(ws);
        }
        if let Some(dir) = lookup(ENV_LOG_DIR).filter(|v| !v.is_empty()) {
            self.log_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("base_url `{}`: {e}", self.base_url)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base_url must be http or https, got `{}`",
                base.scheme()
            )));
        }
        if let Some(ws) = &self.ws_url {
            let ws = Url::parse(ws).map_err(|e| ClientError::Config(format!("ws_url `{ws}`: {e}")))?;
            if !matches!(ws.scheme(), "ws" | "wss") {
                return Err(ClientError::Config(format!(
                    "ws_url must be ws or wss, got `{}`",
                    ws.scheme()
                )));
            }
        }

        let intervals = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("manual_reconnect_delay_ms", self.manual_reconnect_delay_ms),
            ("poll_interval_ms", self.poll_interval_ms),
            ("duplicate_window_ms", self.duplicate_window_ms),
            ("reconnect.initial_delay_ms", self.reconnect.initial_delay_ms),
            ("reconnect.max_delay_ms", self.reconnect.max_delay_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(ClientError::Config(format!("{name} must be greater than zero")));
        }
        let multiplier = self.reconnect.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(ClientError::Config(
                "reconnect.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Realtime URL: explicit, or `base_url` with ws(s) scheme and path `/ws`.
    pub fn ws_url(&self) -> Result<String, ClientError> {
        if let Some(ws) = &self.ws_url {
            return Ok(ws.clone());
        }
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::Config(format!("base_url `{}`: {e}", self.base_url)))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Config(format!("cannot derive ws url from `{}`", self.base_url)))?;
        url.set_path("/ws");
        url.set_query(None);
        Ok(url.to_string())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.reconnect.max_attempts,
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            backoff_multiplier: self.reconnect.backoff_multiplier,
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
        }
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            manual_reconnect_delay: Duration::from_millis(self.manual_reconnect_delay_ms),
            reconnect: self.reconnect_policy(),
        }
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            duplicate_window: Duration::from_millis(self.duplicate_window_ms),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
