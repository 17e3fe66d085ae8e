//! Relay server configuration.

use std::time::Duration;

use pilot_settings::RelaySettings;
use serde::{Deserialize, Serialize};

/// Environment variable named in the port-in-use error.
pub const PORT_ENV_VAR: &str = "FIGMA_WS_PORT";

/// Configuration for [`RelayServer`](crate::server::RelayServer).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` picks a free port).
    pub port: u16,
    /// Default command timeout.
    pub request_timeout: Duration,
    /// Heartbeat sweep interval.
    pub heartbeat_interval: Duration,
    /// Silence tolerated past one interval.
    pub heartbeat_grace: Duration,
    /// Per-endpoint outbound queue capacity.
    pub max_send_queue: usize,
    /// Largest inbound WebSocket message in bytes.
    pub max_message_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            request_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_grace: Duration::from_secs(10),
            max_send_queue: 256,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            host: settings.ws_host.clone(),
            port: settings.ws_port,
            request_timeout: settings.request_timeout(),
            heartbeat_interval: settings.heartbeat_interval(),
            heartbeat_grace: settings.heartbeat_grace(),
            max_send_queue: settings.max_send_queue,
            max_message_size: settings.max_message_size,
        }
    }
}

impl RelayConfig {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Relay URL for a given port.
    pub fn ws_url(&self, port: u16) -> String {
        format!("ws://{}:{port}", self.host)
    }
}
