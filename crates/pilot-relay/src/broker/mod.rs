//! Relay broker: endpoint registry, frame dispatch, and channel fan-out.
//!
//! Locks are `parking_lot` and never held across an `.await`. Structural
//! changes take the endpoint lock before the channel lock, which keeps every
//! channel member a registered endpoint even when a join races an eviction.

pub mod channels;
pub mod endpoint;
pub mod heartbeat;

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use pilot_core::{ConnectionId, Frame, FrameError};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

pub use channels::ChannelRegistry;
pub use endpoint::{Endpoint, SendFailure};
pub use heartbeat::{HeartbeatMonitor, SweepReport};

/// Observer of inbound `broadcast` frames.
///
/// The controller session registers one to pick correlated responses out of
/// the frame stream without the broker knowing about requests.
pub trait BroadcastTap: Send + Sync {
    /// Called after the payload was fanned out. Returns `true` if the tap
    /// consumed it as a response.
    fn observe(&self, channel: &str, payload: &Value) -> bool;
}

/// What [`RelayBroker::on_frame`] did with a frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Endpoint joined a channel.
    Joined {
        /// Channel name.
        channel: String,
    },
    /// Endpoint left a channel.
    Left {
        /// Channel name.
        channel: String,
        /// Whether the endpoint had been a member.
        was_member: bool,
    },
    /// Payload fanned out to the channel.
    Broadcast {
        /// Channel name.
        channel: String,
        /// Members that accepted the frame.
        delivered: usize,
        /// Whether the payload resolved a pending request.
        correlated: bool,
    },
    /// A `pong` was queued in reply to `ping`.
    Pong,
    /// Liveness refreshed by `pong`.
    Alive,
    /// Unparseable or incomplete frame, discarded.
    Malformed,
    /// A `type` the relay does not handle.
    UnknownType(String),
    /// Frame from an endpoint the broker does not know.
    UnknownEndpoint,
}

/// Accepts endpoints, dispatches their frames, and fans out broadcasts.
#[derive(Default)]
pub struct RelayBroker {
    endpoints: RwLock<HashMap<ConnectionId, Arc<Endpoint>>>,
    channels: ChannelRegistry,
    tap: RwLock<Option<Arc<dyn BroadcastTap>>>,
}

impl RelayBroker {
    /// Empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the broadcast observer, replacing any previous one.
    pub fn set_tap(&self, tap: Arc<dyn BroadcastTap>) {
        *self.tap.write() = Some(tap);
    }

    /// Register a new endpoint whose outbound frames go to `tx`.
    pub fn on_connect(&self, tx: mpsc::Sender<Arc<String>>) -> Arc<Endpoint> {
        let endpoint = Arc::new(Endpoint::new(tx));
        let total = {
            let mut endpoints = self.endpoints.write();
            let _ = endpoints.insert(endpoint.id().clone(), endpoint.clone());
            endpoints.len()
        };
        info!(conn_id = %endpoint.id(), total, "endpoint connected");
        endpoint
    }

    /// Handle one raw text frame from `id`.
    ///
    /// Never fails: bad input is logged and reported in the outcome, and the
    /// endpoint stays connected.
    pub fn on_frame(&self, id: &ConnectionId, raw: &str) -> FrameOutcome {
        let Some(endpoint) = self.endpoint(id) else {
            debug!(conn_id = %id, "frame from unknown endpoint ignored");
            return FrameOutcome::UnknownEndpoint;
        };

        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(FrameError::Unknown(kind)) => {
                warn!(conn_id = %id, frame_type = %kind, "unknown frame type");
                return FrameOutcome::UnknownType(kind);
            }
            Err(e) => {
                counter!("relay_frames_malformed_total").increment(1);
                warn!(conn_id = %id, error = %e, "failed to parse frame");
                return FrameOutcome::Malformed;
            }
        };
        trace!(conn_id = %id, frame_type = frame.kind(), "frame received");

        match frame {
            Frame::Join { channel } => {
                if self.join(id, &channel) {
                    info!(conn_id = %id, channel, "endpoint joined channel");
                    FrameOutcome::Joined { channel }
                } else {
                    FrameOutcome::UnknownEndpoint
                }
            }
            Frame::Leave { channel } => {
                let was_member = self.leave(id, &channel);
                info!(conn_id = %id, channel, was_member, "endpoint left channel");
                FrameOutcome::Left {
                    channel,
                    was_member,
                }
            }
            Frame::Message { channel, message } => {
                let frame = Frame::Broadcast {
                    channel: channel.clone(),
                    message,
                };
                let delivered = self.broadcast(&channel, &frame);
                FrameOutcome::Broadcast {
                    channel,
                    delivered,
                    correlated: false,
                }
            }
            Frame::Broadcast { channel, message } => {
                let frame = Frame::Broadcast {
                    channel: channel.clone(),
                    message: message.clone(),
                };
                let delivered = self.broadcast(&channel, &frame);
                let tap = self.tap.read().clone();
                let correlated = tap.is_some_and(|tap| tap.observe(&channel, &message));
                FrameOutcome::Broadcast {
                    channel,
                    delivered,
                    correlated,
                }
            }
            Frame::Ping => {
                if let Err(e) = endpoint.send(Arc::new(Frame::Pong.to_json())) {
                    warn!(conn_id = %id, error = %e, "failed to queue pong");
                }
                FrameOutcome::Pong
            }
            Frame::Pong => {
                endpoint.mark_alive();
                FrameOutcome::Alive
            }
        }
    }

    /// Remove an endpoint from every channel and forget it. Idempotent.
    pub fn on_disconnect(&self, id: &ConnectionId) {
        let mut endpoints = self.endpoints.write();
        let Some(endpoint) = endpoints.remove(id) else {
            return;
        };
        for channel in endpoint.take_channels() {
            let _ = self.channels.leave(&channel, id);
        }
        let total = endpoints.len();
        drop(endpoints);
        info!(conn_id = %id, total, "endpoint disconnected");
    }

    /// Close an endpoint's socket and disconnect it.
    pub fn evict(&self, id: &ConnectionId) {
        if let Some(endpoint) = self.endpoint(id) {
            endpoint.close();
        }
        self.on_disconnect(id);
    }

    /// Close every endpoint's socket. Used at shutdown.
    pub fn close_all(&self) {
        for endpoint in self.endpoints() {
            endpoint.close();
        }
    }

    /// Send `frame` to every open member of `channel`.
    ///
    /// Serializes once. A member whose queue is full or closed is logged and
    /// skipped; delivery to the rest continues. Returns how many members
    /// accepted the frame.
    pub fn broadcast(&self, channel: &str, frame: &Frame) -> usize {
        let members = self.members(channel);
        if members.is_empty() {
            debug!(channel, "broadcast to empty channel");
            return 0;
        }

        let json = Arc::new(frame.to_json());
        let mut delivered = 0;
        for member in &members {
            if !member.is_open() {
                continue;
            }
            match member.send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(
                        conn_id = %member.id(),
                        channel,
                        error = %e,
                        "failed to send frame to endpoint"
                    );
                }
            }
        }
        debug!(channel, recipients = members.len(), delivered, "broadcast frame");
        delivered
    }

    /// Number of members of `channel`.
    pub fn member_count(&self, channel: &str) -> usize {
        self.channels.member_count(channel)
    }

    /// Sorted names of channels that currently have members.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.channel_names()
    }

    /// Number of registered endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.read().len()
    }

    /// Look up an endpoint.
    pub fn endpoint(&self, id: &ConnectionId) -> Option<Arc<Endpoint>> {
        self.endpoints.read().get(id).cloned()
    }

    /// Snapshot of all registered endpoints.
    pub fn endpoints(&self) -> Vec<Arc<Endpoint>> {
        self.endpoints.read().values().cloned().collect()
    }

    fn members(&self, channel: &str) -> Vec<Arc<Endpoint>> {
        let endpoints = self.endpoints.read();
        self.channels
            .members(channel)
            .iter()
            .filter_map(|id| endpoints.get(id).cloned())
            .collect()
    }

    fn join(&self, id: &ConnectionId, channel: &str) -> bool {
        let endpoints = self.endpoints.read();
        let Some(endpoint) = endpoints.get(id) else {
            return false;
        };
        let _ = endpoint.add_channel(channel);
        let _ = self.channels.join(channel, id);
        true
    }

    fn leave(&self, id: &ConnectionId, channel: &str) -> bool {
        let endpoints = self.endpoints.read();
        if let Some(endpoint) = endpoints.get(id) {
            let _ = endpoint.remove_channel(channel);
        }
        self.channels.leave(channel, id)
    }
}
