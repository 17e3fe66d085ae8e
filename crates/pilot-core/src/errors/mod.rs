//! Error types for the relay.
//!
//! - [`RelayError`]: failures returned to callers of the controller session
//!   and the server bootstrap
//! - [`FrameError`]: inbound frame parse failures, logged by the broker and
//!   never surfaced to a peer
//!
//! [`codes`] holds the numeric code families and [`parse`] classifies plugin
//! error strings into them.

pub mod codes;
pub mod parse;

use std::time::Duration;

use thiserror::Error;

use crate::errors::codes::ErrorCode;
use crate::ids::RequestId;

/// Errors returned by relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The controller has no active channel.
    #[error("Not connected to Figma. Use pilot_connect first.")]
    NotConnected,

    /// The active channel has no members.
    #[error("No Figma plugin connected to this channel.")]
    NoPluginConnected {
        /// Channel that was empty.
        channel: String,
    },

    /// No response arrived before the deadline.
    #[error("Command timeout: {command}")]
    CommandTimeout {
        /// Command name.
        command: String,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// A pending request with this id already exists.
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(RequestId),

    /// The pending table was dropped before a response arrived.
    #[error("Command abandoned: {command}")]
    Abandoned {
        /// Command name.
        command: String,
    },

    /// The listening port is taken.
    #[error("Port {port} is already in use. Please stop the other process or change {env_var}.")]
    PortInUse {
        /// Port that failed to bind.
        port: u16,
        /// Environment variable that selects the port.
        env_var: &'static str,
    },

    /// Any other bind failure.
    #[error("failed to bind {addr}: {message}")]
    Bind {
        /// Address that failed to bind.
        addr: String,
        /// Underlying I/O error text.
        message: String,
    },
}

impl RelayError {
    /// Error code reported to the tool layer.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotConnected => ErrorCode::NotConnected,
            Self::NoPluginConnected { .. } => ErrorCode::ChannelNotFound,
            Self::CommandTimeout { .. } => ErrorCode::CommandTimeout,
            Self::DuplicateRequestId(_) | Self::Abandoned { .. } => ErrorCode::CommandFailed,
            Self::PortInUse { .. } | Self::Bind { .. } => ErrorCode::ConnectionFailed,
        }
    }
}

/// Inbound frame parse failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Not JSON, or a known frame missing required fields.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// JSON without a string `type`.
    #[error("frame has no type")]
    MissingType,

    /// A `type` the relay does not handle.
    #[error("unknown frame type: {0}")]
    Unknown(String),
}
