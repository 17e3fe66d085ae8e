//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs.
    pub status: String,
    /// Seconds since start.
    pub uptime_secs: u64,
    /// Registered endpoints.
    pub connections: usize,
    /// Channels with at least one member.
    pub channels: usize,
    /// Commands awaiting a response.
    pub pending_requests: usize,
    /// Whether the controller's channel has a plugin.
    pub controller_connected: bool,
}

/// Live counters feeding [`health_check`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCounts {
    /// Registered endpoints.
    pub connections: usize,
    /// Channels with at least one member.
    pub channels: usize,
    /// Commands awaiting a response.
    pub pending_requests: usize,
    /// Whether the controller's channel has a plugin.
    pub controller_connected: bool,
}

/// Build a health response.
pub fn health_check(start_time: Instant, counts: HealthCounts) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: counts.connections,
        channels: counts.channels,
        pending_requests: counts.pending_requests,
        controller_connected: counts.controller_connected,
    }
}
