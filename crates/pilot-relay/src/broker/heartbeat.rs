//! Heartbeat probing and eviction of silent endpoints.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use pilot_core::{ConnectionId, Frame};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::RelayBroker;

/// Result of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Endpoints that were sent a `ping`.
    pub probed: usize,
    /// Endpoints that were evicted.
    pub evicted: Vec<ConnectionId>,
}

/// Periodic liveness check.
///
/// Any registered endpoint silent for longer than `interval + grace` is
/// evicted without being probed, whether or not its writer is still running.
/// Every other open endpoint gets a `ping` frame.
#[derive(Clone, Copy, Debug)]
pub struct HeartbeatMonitor {
    interval: Duration,
    grace: Duration,
}

impl HeartbeatMonitor {
    /// Monitor sweeping every `interval`.
    pub fn new(interval: Duration, grace: Duration) -> Self {
        Self { interval, grace }
    }

    /// Longest silence tolerated.
    pub fn deadline(&self) -> Duration {
        self.interval + self.grace
    }

    /// Check every endpoint against `now`.
    pub fn sweep(&self, broker: &RelayBroker, now: Instant) -> SweepReport {
        let deadline = self.deadline();
        let ping = Arc::new(Frame::Ping.to_json());
        let mut report = SweepReport::default();

        for endpoint in broker.endpoints() {
            let silence = endpoint.silence_at(now);
            if silence > deadline {
                warn!(
                    conn_id = %endpoint.id(),
                    silence_ms = u64::try_from(silence.as_millis()).unwrap_or(u64::MAX),
                    "heartbeat timeout, closing connection"
                );
                counter!("relay_heartbeat_evictions_total").increment(1);
                broker.evict(endpoint.id());
                report.evicted.push(endpoint.id().clone());
                continue;
            }
            if !endpoint.is_open() {
                continue;
            }
            match endpoint.send(ping.clone()) {
                Ok(()) => report.probed += 1,
                Err(e) => warn!(conn_id = %endpoint.id(), error = %e, "failed to queue ping"),
            }
        }
        report
    }

    /// Run sweeps until `cancel` fires. The first sweep happens one interval
    /// after the call.
    pub fn spawn(self, broker: Arc<RelayBroker>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.sweep(&broker, Instant::now());
                        debug!(
                            probed = report.probed,
                            evicted = report.evicted.len(),
                            "heartbeat sweep"
                        );
                    }
                    () = cancel.cancelled() => break,
                }
            }
            debug!("heartbeat stopped");
        })
    }
}
