//! Relay wire protocol.
//!
//! Every transport message is a JSON object discriminated by `type`. Command
//! and response envelopes ride inside the `message` field of a `broadcast`
//! frame; the relay never interprets them beyond correlation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::FrameError;
use crate::errors::parse::{PluginError, classify_plugin_error};
use crate::ids::RequestId;

/// A relay transport frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Subscribe the sending endpoint to a channel.
    Join {
        /// Channel name.
        channel: String,
    },
    /// Unsubscribe the sending endpoint from a channel.
    Leave {
        /// Channel name.
        channel: String,
    },
    /// Ask the relay to re-emit `message` as a broadcast on `channel`.
    Message {
        /// Channel name.
        channel: String,
        /// Opaque payload.
        #[serde(default)]
        message: Value,
    },
    /// Payload delivered to every member of `channel`.
    Broadcast {
        /// Channel name.
        channel: String,
        /// Opaque payload.
        #[serde(default)]
        message: Value,
    },
    /// Liveness probe.
    Ping,
    /// Liveness answer.
    Pong,
}

impl Frame {
    /// Frame kinds the relay understands.
    pub const KINDS: [&'static str; 6] = ["join", "leave", "message", "broadcast", "ping", "pong"];

    /// Parse a raw text frame.
    ///
    /// Distinguishes unparseable input and missing `type` (malformed) from a
    /// well-formed object with a `type` the relay does not know.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| FrameError::Malformed(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?;
        if !Self::KINDS.contains(&kind) {
            return Err(FrameError::Unknown(kind.to_owned()));
        }
        serde_json::from_value(value).map_err(|e| FrameError::Malformed(e.to_string()))
    }

    /// The `type` discriminator of this frame.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Message { .. } => "message",
            Self::Broadcast { .. } => "broadcast",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> String {
        // Frame holds only strings and JSON values, serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A command sent from the controller to the plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Correlation id.
    pub id: RequestId,
    /// Command name, interpreted only by the plugin.
    pub command: String,
    /// Command parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl CommandEnvelope {
    /// Build an envelope with a fresh correlation id.
    pub fn new(command: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            id: RequestId::new(),
            command: command.into(),
            params,
        }
    }

    /// The envelope as a JSON payload for a `broadcast` frame.
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "command": self.command,
            "params": self.params,
        })
    }

    /// Interpret a broadcast payload as a command, if it is one.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        if !payload.get("command").is_some_and(Value::is_string) {
            return None;
        }
        serde_json::from_value(payload.clone()).ok()
    }
}

/// The plugin's answer to a [`CommandEnvelope`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Correlation id copied from the command.
    pub id: RequestId,
    /// Whether the command succeeded.
    pub success: bool,
    /// Command result on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// A successful response.
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// A failed response.
    pub fn failure(id: RequestId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Interpret a broadcast payload as a response.
    ///
    /// A payload qualifies when it is an object with a string `id` and a
    /// boolean `success`; anything else (including command envelopes echoed
    /// back to the channel) is not a response.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;
        let shaped = obj.get("id").is_some_and(Value::is_string)
            && obj.get("success").is_some_and(Value::is_boolean);
        if !shaped {
            return None;
        }
        serde_json::from_value(payload.clone()).ok()
    }

    /// The envelope as a JSON payload for a `broadcast` frame.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Convert into the tool-layer result.
    ///
    /// `success:true` yields the result (`Null` when absent), so an empty
    /// success stays distinguishable from a failure. `success:false` yields a
    /// classified [`PluginError`].
    pub fn into_result(self) -> Result<Value, PluginError> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            let message = self
                .error
                .unwrap_or_else(|| "Command execution failed.".to_owned());
            Err(classify_plugin_error(&message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::codes::ErrorCode;
    use assert_matches::assert_matches;

    #[test]
    fn parse_join() {
        let frame = Frame::parse(r#"{"type":"join","channel":"ch1"}"#).unwrap();
        assert_eq!(
            frame,
            Frame::Join {
                channel: "ch1".into()
            }
        );
        assert_eq!(frame.kind(), "join");
    }

    #[test]
    fn parse_message_keeps_payload() {
        let frame =
            Frame::parse(r#"{"type":"message","channel":"c","message":{"a":[1,2]}}"#).unwrap();
        assert_matches!(frame, Frame::Message { channel, message } => {
            assert_eq!(channel, "c");
            assert_eq!(message["a"][1], 2);
        });
    }

    #[test]
    fn parse_broadcast_without_message_defaults_to_null() {
        let frame = Frame::parse(r#"{"type":"broadcast","channel":"c"}"#).unwrap();
        assert_matches!(frame, Frame::Broadcast { message: Value::Null, .. });
    }

    #[test]
    fn parse_ping_and_pong() {
        assert_eq!(Frame::parse(r#"{"type":"ping"}"#).unwrap(), Frame::Ping);
        assert_eq!(Frame::parse(r#"{"type":"pong"}"#).unwrap(), Frame::Pong);
    }

    #[test]
    fn parse_invalid_json_is_malformed() {
        assert_matches!(Frame::parse("not json"), Err(FrameError::Malformed(_)));
        assert_matches!(Frame::parse(""), Err(FrameError::Malformed(_)));
    }

    #[test]
    fn parse_missing_type() {
        assert_matches!(Frame::parse(r#"{"channel":"c"}"#), Err(FrameError::MissingType));
        assert_matches!(Frame::parse("[1,2,3]"), Err(FrameError::MissingType));
    }

    #[test]
    fn parse_unknown_type() {
        assert_matches!(
            Frame::parse(r#"{"type":"subscribe","channel":"c"}"#),
            Err(FrameError::Unknown(kind)) if kind == "subscribe"
        );
    }

    #[test]
    fn parse_join_without_channel_is_malformed() {
        assert_matches!(Frame::parse(r#"{"type":"join"}"#), Err(FrameError::Malformed(_)));
    }

    #[test]
    fn frame_wire_shape() {
        let json: Value = serde_json::from_str(
            &Frame::Broadcast {
                channel: "ch".into(),
                message: json!({"x": 1}),
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(json["type"], "broadcast");
        assert_eq!(json["channel"], "ch");
        assert_eq!(json["message"]["x"], 1);

        assert_eq!(Frame::Ping.to_json(), r#"{"type":"ping"}"#);
        assert_eq!(Frame::Pong.to_json(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn command_envelope_payload() {
        let mut params = Map::new();
        let _ = params.insert("width".into(), json!(100));
        let cmd = CommandEnvelope::new("create_frame", params);
        let value = cmd.to_value();
        assert_eq!(value["command"], "create_frame");
        assert_eq!(value["params"]["width"], 100);
        assert_eq!(value["id"], cmd.id.as_str());
        assert_eq!(CommandEnvelope::from_payload(&value), Some(cmd));
    }

    #[test]
    fn command_is_not_a_response() {
        let cmd = CommandEnvelope::new("ping", Map::new());
        assert!(ResponseEnvelope::from_payload(&cmd.to_value()).is_none());
    }

    #[test]
    fn response_from_payload_requires_id_and_success() {
        assert!(ResponseEnvelope::from_payload(&json!({"id": "a", "success": true})).is_some());
        assert!(ResponseEnvelope::from_payload(&json!({"id": "a"})).is_none());
        assert!(ResponseEnvelope::from_payload(&json!({"id": 7, "success": true})).is_none());
        assert!(ResponseEnvelope::from_payload(&json!({"id": "a", "success": "yes"})).is_none());
        assert!(ResponseEnvelope::from_payload(&json!("text")).is_none());
        assert!(ResponseEnvelope::from_payload(&Value::Null).is_none());
    }

    #[test]
    fn response_keeps_result_verbatim() {
        let payload = json!({"id": "r1", "success": true, "result": {"id": "1:1"}});
        let resp = ResponseEnvelope::from_payload(&payload).unwrap();
        assert_eq!(resp.result, Some(json!({"id": "1:1"})));
        assert_eq!(resp.to_value(), payload);
    }

    #[test]
    fn empty_success_is_not_a_failure() {
        let resp = ResponseEnvelope {
            id: RequestId::from_raw("r"),
            success: true,
            result: None,
            error: None,
        };
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn failure_is_classified() {
        let resp = ResponseEnvelope::failure(RequestId::from_raw("r"), "Node not found: 1:2");
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::NodeNotFound);
        assert_eq!(err.message, "Node not found: 1:2");
    }

    #[test]
    fn failure_without_message_uses_default() {
        let resp = ResponseEnvelope {
            id: RequestId::from_raw("r"),
            success: false,
            result: None,
            error: None,
        };
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::CommandFailed);
    }
}
