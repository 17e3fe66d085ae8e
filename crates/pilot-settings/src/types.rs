//! Relay settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Relay server and controller settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// WebSocket listening port.
    pub ws_port: u16,
    /// Bind host.
    pub ws_host: String,
    /// Default command timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Heartbeat sweep interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Extra silence tolerated past one interval before eviction.
    pub heartbeat_grace_ms: u64,
    /// Per-endpoint outbound queue capacity.
    pub max_send_queue: usize,
    /// Largest accepted inbound WebSocket message in bytes.
    pub max_message_size: usize,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            ws_port: 3846,
            ws_host: "localhost".to_string(),
            request_timeout_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_grace_ms: 10_000,
            max_send_queue: 256,
            max_message_size: 16 * 1024 * 1024,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

impl RelaySettings {
    /// Default command timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Heartbeat sweep interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat grace period.
    pub fn heartbeat_grace(&self) -> Duration {
        Duration::from_millis(self.heartbeat_grace_ms)
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ws_host.is_empty() {
            return Err(SettingsError::InvalidValue("wsHost must not be empty".into()));
        }
        if self.request_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "requestTimeoutMs must be at least 1".into(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatIntervalMs must be at least 1".into(),
            ));
        }
        if self.max_send_queue == 0 {
            return Err(SettingsError::InvalidValue(
                "maxSendQueue must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
