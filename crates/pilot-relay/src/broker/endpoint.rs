//! Per-connection endpoint state.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pilot_core::ConnectionId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a frame could not be queued for an endpoint.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SendFailure {
    /// The outbound queue is at capacity.
    #[error("send queue full")]
    Full,
    /// The writer side has gone away.
    #[error("endpoint closed")]
    Closed,
}

/// One open WebSocket connection as the broker sees it.
///
/// Outbound frames go through a bounded queue drained by the connection's
/// writer task, so sending never blocks the caller.
pub struct Endpoint {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<String>>,
    channels: Mutex<BTreeSet<String>>,
    last_liveness: Mutex<Instant>,
    connected_at: DateTime<Utc>,
    closed: CancellationToken,
    dropped_messages: AtomicU64,
}

impl Endpoint {
    /// Create an endpoint with a fresh id; liveness starts now.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: ConnectionId::new(),
            tx,
            channels: Mutex::new(BTreeSet::new()),
            last_liveness: Mutex::new(Instant::now()),
            connected_at: Utc::now(),
            closed: CancellationToken::new(),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a serialized frame.
    ///
    /// A failure bumps the dropped-message counter and leaves the endpoint
    /// registered; removal is the job of disconnect or eviction.
    pub fn send(&self, frame: Arc<String>) -> Result<(), SendFailure> {
        if self.closed.is_cancelled() {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            return Err(SendFailure::Closed);
        }
        self.tx.try_send(frame).map_err(|e| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => SendFailure::Full,
                mpsc::error::TrySendError::Closed(_) => SendFailure::Closed,
            }
        })
    }

    /// Whether frames can still be queued.
    pub fn is_open(&self) -> bool {
        !self.closed.is_cancelled() && !self.tx.is_closed()
    }

    /// Record a liveness signal.
    pub fn mark_alive(&self) {
        *self.last_liveness.lock() = Instant::now();
    }

    /// Instant of the last liveness signal.
    pub fn last_liveness(&self) -> Instant {
        *self.last_liveness.lock()
    }

    /// Silence observed at `now`.
    pub fn silence_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_liveness())
    }

    /// Wall-clock connection time.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Ask the connection's tasks to close the socket.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Token cancelled once [`close`](Self::close) is called.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Frames dropped because the queue was full or closed.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Snapshot of joined channels, sorted.
    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().iter().cloned().collect()
    }

    pub(crate) fn add_channel(&self, channel: &str) -> bool {
        self.channels.lock().insert(channel.to_owned())
    }

    pub(crate) fn remove_channel(&self, channel: &str) -> bool {
        self.channels.lock().remove(channel)
    }

    pub(crate) fn take_channels(&self) -> BTreeSet<String> {
        std::mem::take(&mut *self.channels.lock())
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("channels", &*self.channels.lock())
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
