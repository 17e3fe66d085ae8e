//! Controller session: the single logical client that issues commands to the
//! plugin on one channel and awaits correlated responses.

pub mod correlation;

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::RwLock;
use pilot_core::{CommandEnvelope, Frame, RelayError, RequestId, ResponseEnvelope};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::broker::{BroadcastTap, RelayBroker};

pub use correlation::CorrelationTable;

/// Snapshot returned by [`ControllerSession::status`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    /// Whether the active channel has at least one member.
    pub connected: bool,
    /// Active channel, if any.
    pub channel: Option<String>,
    /// Relay address plugins connect to.
    pub url: String,
}

/// State shared with the broker through the broadcast tap.
#[derive(Default)]
struct ControllerState {
    channel: RwLock<Option<String>>,
    pending: CorrelationTable,
}

impl BroadcastTap for ControllerState {
    fn observe(&self, channel: &str, payload: &Value) -> bool {
        if self.channel.read().as_deref() != Some(channel) {
            return false;
        }
        let Some(response) = ResponseEnvelope::from_payload(payload) else {
            return false;
        };
        let request_id = response.id.clone();
        let resolved = self.pending.resolve(response);
        if resolved {
            debug!(%request_id, channel, "response correlated");
        } else {
            debug!(%request_id, channel, "uncorrelated response dropped");
        }
        resolved
    }
}

/// Removes a pending entry when the waiting call ends, including when the
/// caller drops the future before it settles.
struct PendingGuard<'a> {
    table: &'a CorrelationTable,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.remove(&self.id) {
            debug!(request_id = %self.id, "pending request cancelled by caller");
        }
    }
}

/// Issues commands over the broker and matches their responses.
pub struct ControllerSession {
    broker: Arc<RelayBroker>,
    state: Arc<ControllerState>,
    default_timeout: Duration,
    url: RwLock<String>,
}

impl ControllerSession {
    /// Attach a session to `broker`. Commands sent without an explicit
    /// timeout wait `default_timeout`.
    pub fn new(broker: Arc<RelayBroker>, default_timeout: Duration) -> Self {
        let state = Arc::new(ControllerState::default());
        broker.set_tap(state.clone());
        Self {
            broker,
            state,
            default_timeout,
            url: RwLock::new(String::new()),
        }
    }

    /// Set the relay address reported by [`status`](Self::status).
    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.set_url(url);
        self
    }

    /// Replace the reported relay address.
    pub fn set_url(&self, url: impl Into<String>) {
        *self.url.write() = url.into();
    }

    /// Make `channel` the active channel. Succeeds even when nothing has
    /// joined it yet.
    pub fn connect(&self, channel: impl Into<String>) {
        let channel = channel.into();
        if self.broker.member_count(&channel) == 0 {
            warn!(channel, "no plugin connected to channel yet");
        }
        info!(channel, "controller connected to channel");
        *self.state.channel.write() = Some(channel);
    }

    /// Clear the active channel. Pending requests keep waiting for their
    /// timeout.
    pub fn disconnect(&self) {
        let previous = self.state.channel.write().take();
        info!(channel = ?previous, "controller disconnected from channel");
    }

    /// Active channel.
    pub fn channel(&self) -> Option<String> {
        self.state.channel.read().clone()
    }

    /// Whether the active channel has at least one member.
    pub fn is_connected(&self) -> bool {
        self.channel()
            .is_some_and(|channel| self.broker.member_count(&channel) > 0)
    }

    /// Connection snapshot.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            connected: self.is_connected(),
            channel: self.channel(),
            url: self.url.read().clone(),
        }
    }

    /// Timeout used by [`send_command`](Self::send_command).
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.state.pending.len()
    }

    /// Fail every outstanding request with [`RelayError::Abandoned`].
    pub fn abandon_pending(&self) -> usize {
        let n = self.state.pending.clear();
        if n > 0 {
            warn!(count = n, "abandoning pending requests");
        }
        n
    }

    /// Send a command and wait up to the default timeout for its response.
    pub async fn send_command(
        &self,
        command: &str,
        params: Map<String, Value>,
    ) -> Result<ResponseEnvelope, RelayError> {
        self.send_command_with_timeout(command, params, self.default_timeout)
            .await
    }

    /// Send a command and wait up to `timeout` for its response.
    ///
    /// The request is registered before the command is published, so a
    /// response cannot outrun its table entry. Every exit removes only this
    /// request's entry: response, timeout, or the future being dropped.
    pub async fn send_command_with_timeout(
        &self,
        command: &str,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, RelayError> {
        let channel = self.channel().ok_or(RelayError::NotConnected)?;
        if self.broker.member_count(&channel) == 0 {
            return Err(RelayError::NoPluginConnected { channel });
        }

        let envelope = CommandEnvelope::new(command, params);
        let request_id = envelope.id.clone();
        let mut rx = self.state.pending.register(request_id.clone())?;
        let _guard = PendingGuard {
            table: &self.state.pending,
            id: request_id.clone(),
        };

        let frame = Frame::Broadcast {
            channel: channel.clone(),
            message: envelope.to_value(),
        };
        let delivered = self.broker.broadcast(&channel, &frame);
        debug!(command, %request_id, channel, delivered, "sent command");

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RelayError::Abandoned {
                command: command.to_owned(),
            }),
            Err(_) => {
                if self.state.pending.remove(&request_id) {
                    counter!("relay_command_timeouts_total").increment(1);
                    warn!(command, %request_id, ?timeout, "command timed out");
                    return Err(RelayError::CommandTimeout {
                        command: command.to_owned(),
                        timeout,
                    });
                }
                // resolved between the deadline and the removal
                rx.try_recv().map_err(|_| RelayError::Abandoned {
                    command: command.to_owned(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::broker::{Endpoint, FrameOutcome};
    use serde_json::json;
    use tokio::sync::mpsc;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn setup() -> (Arc<RelayBroker>, ControllerSession) {
        let broker = Arc::new(RelayBroker::new());
        let session = ControllerSession::new(broker.clone(), Duration::from_secs(30))
            .with_url("ws://localhost:3846");
        (broker, session)
    }

    fn plugin(
        broker: &RelayBroker,
        channel: &str,
    ) -> (Arc<Endpoint>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(64);
        let ep = broker.on_connect(tx);
        let raw = json!({"type": "join", "channel": channel}).to_string();
        assert_matches!(broker.on_frame(ep.id(), &raw), FrameOutcome::Joined { .. });
        (ep, rx)
    }

    /// Read the next command envelope the plugin received.
    async fn next_command(rx: &mut mpsc::Receiver<Arc<String>>) -> CommandEnvelope {
        let raw = rx.recv().await.unwrap();
        let frame: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(frame["type"], "broadcast");
        CommandEnvelope::from_payload(&frame["message"]).unwrap()
    }

    fn reply(
        broker: &RelayBroker,
        ep: &Endpoint,
        channel: &str,
        response: &ResponseEnvelope,
    ) -> FrameOutcome {
        let raw = json!({
            "type": "broadcast",
            "channel": channel,
            "message": response.to_value(),
        })
        .to_string();
        broker.on_frame(ep.id(), &raw)
    }

    #[tokio::test]
    async fn not_connected_without_channel() {
        let (_broker, session) = setup();
        let err = session.send_command("ping", Map::new()).await.unwrap_err();
        assert_matches!(err, RelayError::NotConnected);
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn no_plugin_on_empty_channel() {
        let (_broker, session) = setup();
        session.connect("abc");
        assert!(!session.status().connected);

        let err = session.send_command("ping", Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "No Figma plugin connected to this channel.");
        assert_matches!(err, RelayError::NoPluginConnected { channel } if channel == "abc");
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn create_frame_round_trip() {
        let (broker, session) = setup();
        let (ep, mut rx) = plugin(&broker, "abc");
        session.connect("abc");

        let plugin_side = {
            let broker = broker.clone();
            async move {
                let cmd = next_command(&mut rx).await;
                assert_eq!(cmd.command, "create_frame");
                assert_eq!(cmd.params["width"], 100);
                let outcome = reply(
                    &broker,
                    &ep,
                    "abc",
                    &ResponseEnvelope::ok(cmd.id, json!({"id": "1:1"})),
                );
                assert_matches!(outcome, FrameOutcome::Broadcast { correlated: true, .. });
            }
        };

        let mut params = Map::new();
        let _ = params.insert("width".into(), json!(100));
        let (response, ()) = tokio::join!(
            session.send_command_with_timeout("create_frame", params, TIMEOUT),
            plugin_side
        );
        let response = response.unwrap();
        assert!(response.success);
        assert_eq!(response.result, Some(json!({"id": "1:1"})));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn failure_response_is_returned_not_raised() {
        let (broker, session) = setup();
        let (ep, mut rx) = plugin(&broker, "abc");
        session.connect("abc");

        let plugin_side = async {
            let cmd = next_command(&mut rx).await;
            let _ = reply(
                &broker,
                &ep,
                "abc",
                &ResponseEnvelope::failure(cmd.id, "Unknown command: explode"),
            );
        };
        let (response, ()) = tokio::join!(
            session.send_command_with_timeout("explode", Map::new(), TIMEOUT),
            plugin_side
        );
        let response = response.unwrap();
        assert!(!response.success);
        assert_eq!(
            response.into_result().unwrap_err().code,
            pilot_core::ErrorCode::UnknownCommand
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cleans_up_entry() {
        let (broker, session) = setup();
        let (_ep, _rx) = plugin(&broker, "abc");
        session.connect("abc");

        let err = session
            .send_command_with_timeout("slow", Map::new(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_matches!(err, RelayError::CommandTimeout { ref command, .. } if command == "slow");
        assert_eq!(err.to_string(), "Command timeout: slow");
        assert_eq!(session.pending_count(), 0);
        // the channel and plugin survive a timeout
        assert!(session.status().connected);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_isolates_other_requests() {
        let (broker, session) = setup();
        let (ep, mut rx) = plugin(&broker, "abc");
        session.connect("abc");

        let short =
            session.send_command_with_timeout("short", Map::new(), Duration::from_millis(100));
        let long =
            session.send_command_with_timeout("long", Map::new(), Duration::from_secs(10));
        let plugin_side = async {
            let first = next_command(&mut rx).await;
            let second = next_command(&mut rx).await;
            assert_eq!(first.command, "short");
            assert_eq!(second.command, "long");
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = reply(&broker, &ep, "abc", &ResponseEnvelope::ok(second.id, json!("done")));
        };

        let (short, long, ()) = tokio::join!(short, long, plugin_side);
        assert_matches!(short, Err(RelayError::CommandTimeout { .. }));
        assert_eq!(long.unwrap().result, Some(json!("done")));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_call_releases_its_entry() {
        let (broker, session) = setup();
        let (_ep, _rx) = plugin(&broker, "abc");
        session.connect("abc");

        let outer = tokio::time::timeout(
            Duration::from_millis(10),
            session.send_command_with_timeout("x", Map::new(), Duration::from_millis(100)),
        )
        .await;
        assert!(outer.is_err());
        assert_eq!(session.pending_count(), 0);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn late_response_after_cancel_is_uncorrelated() {
        let (broker, session) = setup();
        let (ep, mut rx) = plugin(&broker, "abc");
        session.connect("abc");

        let id = {
            let call = session.send_command("x", Map::new());
            tokio::pin!(call);
            tokio::select! {
                _ = &mut call => panic!("call settled without a response"),
                cmd = next_command(&mut rx) => cmd.id,
            }
        };
        assert_eq!(session.pending_count(), 0);

        let outcome = reply(&broker, &ep, "abc", &ResponseEnvelope::ok(id, json!(1)));
        assert_matches!(outcome, FrameOutcome::Broadcast { correlated: false, .. });
    }

    #[tokio::test]
    async fn out_of_order_responses_reach_their_callers() {
        let (broker, session) = setup();
        let (ep, mut rx) = plugin(&broker, "abc");
        session.connect("abc");

        let a = session.send_command_with_timeout("a", Map::new(), TIMEOUT);
        let b = session.send_command_with_timeout("b", Map::new(), TIMEOUT);
        let c = session.send_command_with_timeout("c", Map::new(), TIMEOUT);
        let plugin_side = async {
            let mut cmds = Vec::new();
            for _ in 0..3 {
                cmds.push(next_command(&mut rx).await);
            }
            for cmd in cmds.into_iter().rev() {
                let result = json!(cmd.command.clone());
                let _ = reply(&broker, &ep, "abc", &ResponseEnvelope::ok(cmd.id, result));
            }
        };

        let (a, b, c, ()) = tokio::join!(a, b, c, plugin_side);
        assert_eq!(a.unwrap().result, Some(json!("a")));
        assert_eq!(b.unwrap().result, Some(json!("b")));
        assert_eq!(c.unwrap().result, Some(json!("c")));
    }

    #[tokio::test]
    async fn responses_on_other_channels_are_not_correlated() {
        let (broker, session) = setup();
        let (ep, _rx) = plugin(&broker, "other");
        session.connect("abc");

        let id = RequestId::from_raw("r1");
        let _rx = session.state.pending.register(id.clone()).unwrap();
        let outcome = reply(&broker, &ep, "other", &ResponseEnvelope::ok(id, json!(1)));
        assert_matches!(outcome, FrameOutcome::Broadcast { correlated: false, .. });
        assert_eq!(session.pending_count(), 1);
    }

    #[tokio::test]
    async fn uncorrelated_response_is_ignored() {
        let (broker, session) = setup();
        let (ep, _rx) = plugin(&broker, "abc");
        session.connect("abc");

        let outcome = reply(
            &broker,
            &ep,
            "abc",
            &ResponseEnvelope::ok(RequestId::from_raw("stale"), json!(null)),
        );
        assert_matches!(outcome, FrameOutcome::Broadcast { correlated: false, delivered: 1, .. });
    }

    #[tokio::test]
    async fn abandon_fails_waiters() {
        let (broker, session) = setup();
        let (_ep, mut rx) = plugin(&broker, "abc");
        session.connect("abc");

        let waiter = session.send_command_with_timeout("stuck", Map::new(), TIMEOUT);
        let abandon = async {
            let _ = next_command(&mut rx).await;
            assert_eq!(session.abandon_pending(), 1);
        };
        let (result, ()) = tokio::join!(waiter, abandon);
        assert_matches!(result, Err(RelayError::Abandoned { command }) if command == "stuck");
    }

    #[tokio::test]
    async fn two_plugins_both_receive_command() {
        let (broker, session) = setup();
        let (_a, mut rx_a) = plugin(&broker, "abc");
        let (b, mut rx_b) = plugin(&broker, "abc");
        session.connect("abc");

        let plugin_side = async {
            let from_a = next_command(&mut rx_a).await;
            let from_b = next_command(&mut rx_b).await;
            assert_eq!(from_a, from_b);
            let _ = reply(&broker, &b, "abc", &ResponseEnvelope::ok(from_b.id, json!("b")));
        };
        let (result, ()) = tokio::join!(
            session.send_command_with_timeout("hello", Map::new(), TIMEOUT),
            plugin_side
        );
        assert_eq!(result.unwrap().result, Some(json!("b")));
    }

    #[test]
    fn status_reports_channel_and_url() {
        let (broker, session) = setup();
        assert_eq!(
            session.status(),
            SessionStatus {
                connected: false,
                channel: None,
                url: "ws://localhost:3846".into(),
            }
        );

        let (_ep, _rx) = plugin(&broker, "abc");
        session.connect("abc");
        let status = session.status();
        assert!(status.connected);
        assert_eq!(status.channel.as_deref(), Some("abc"));

        session.disconnect();
        assert_eq!(session.channel(), None);
        assert!(!session.is_connected());
    }

    #[test]
    fn status_serializes() {
        let (_broker, session) = setup();
        let json = serde_json::to_value(session.status()).unwrap();
        assert_eq!(json["connected"], false);
        assert!(json["channel"].is_null());
        assert_eq!(json["url"], "ws://localhost:3846");
    }
}
