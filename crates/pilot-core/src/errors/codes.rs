//! Numeric error codes surfaced to the tool layer.
//!
//! Codes are grouped in families by their thousands digit: connection (1xxx),
//! node (2xxx), command (3xxx), permission (4xxx), resource (5xxx), and
//! plugin (6xxx).

use std::fmt;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// ErrorCode
// ─────────────────────────────────────────────────────────────────────────────

/// Machine-readable error code, serialized as its number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // Connection
    /// No active channel.
    NotConnected = 1001,
    /// Connecting to the plugin failed.
    ConnectionFailed = 1002,
    /// Connecting to the plugin timed out.
    ConnectionTimeout = 1003,
    /// The channel has no plugin.
    ChannelNotFound = 1004,
    /// Transport-level failure.
    WebsocketError = 1005,

    // Node
    /// Node id did not resolve.
    NodeNotFound = 2001,
    /// Operation does not apply to this node type.
    InvalidNodeType = 2002,
    /// Node is locked.
    NodeLocked = 2003,
    /// Node cannot be edited.
    NodeNotEditable = 2004,
    /// Parent node did not resolve.
    ParentNotFound = 2005,

    // Command
    /// Plugin does not know the command.
    UnknownCommand = 3001,
    /// Command parameters were rejected.
    InvalidParams = 3002,
    /// No response before the deadline.
    CommandTimeout = 3003,
    /// Generic command failure.
    CommandFailed = 3004,
    /// Some commands of a batch failed.
    BatchPartialFailure = 3005,

    // Permission
    /// Reads are disabled.
    ReadNotAllowed = 4001,
    /// Writes are disabled.
    WriteNotAllowed = 4002,
    /// Feature is turned off.
    FeatureDisabled = 4003,

    // Resource
    /// Font missing or not loaded.
    FontNotFound = 5001,
    /// Style did not resolve.
    StyleNotFound = 5002,
    /// Component did not resolve.
    ComponentNotFound = 5003,
    /// Variable did not resolve.
    VariableNotFound = 5004,
    /// Image could not be loaded.
    ImageLoadFailed = 5005,

    // Plugin
    /// Plugin reported an internal error.
    PluginError = 6001,
    /// Plugin is not running.
    PluginNotRunning = 6002,
}

impl ErrorCode {
    /// Every code, in numeric order.
    pub const ALL: [Self; 25] = [
        Self::NotConnected,
        Self::ConnectionFailed,
        Self::ConnectionTimeout,
        Self::ChannelNotFound,
        Self::WebsocketError,
        Self::NodeNotFound,
        Self::InvalidNodeType,
        Self::NodeLocked,
        Self::NodeNotEditable,
        Self::ParentNotFound,
        Self::UnknownCommand,
        Self::InvalidParams,
        Self::CommandTimeout,
        Self::CommandFailed,
        Self::BatchPartialFailure,
        Self::ReadNotAllowed,
        Self::WriteNotAllowed,
        Self::FeatureDisabled,
        Self::FontNotFound,
        Self::StyleNotFound,
        Self::ComponentNotFound,
        Self::VariableNotFound,
        Self::ImageLoadFailed,
        Self::PluginError,
        Self::PluginNotRunning,
    ];

    /// Numeric value.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Message used when a caller supplies none.
    #[must_use]
    pub fn default_message(self) -> &'static str {
        match self {
            Self::NotConnected => "Not connected to Figma. Use pilot_connect first.",
            Self::ConnectionFailed => "Failed to connect to Figma plugin.",
            Self::ConnectionTimeout => "Connection to Figma timed out.",
            Self::ChannelNotFound => "Channel not found. Make sure the Figma plugin is running.",
            Self::WebsocketError => "WebSocket communication error.",
            Self::NodeNotFound => "Node not found.",
            Self::InvalidNodeType => "Invalid node type for this operation.",
            Self::NodeLocked => "Node is locked and cannot be modified.",
            Self::NodeNotEditable => "Node is not editable.",
            Self::ParentNotFound => "Parent node not found.",
            Self::UnknownCommand => "Unknown command.",
            Self::InvalidParams => "Invalid parameters.",
            Self::CommandTimeout => "Command timed out.",
            Self::CommandFailed => "Command execution failed.",
            Self::BatchPartialFailure => "Some batch commands failed.",
            Self::ReadNotAllowed => "Read operations not allowed in write-only mode.",
            Self::WriteNotAllowed => "Write operations not allowed.",
            Self::FeatureDisabled => "This feature is disabled.",
            Self::FontNotFound => "Font not found or not loaded.",
            Self::StyleNotFound => "Style not found.",
            Self::ComponentNotFound => "Component not found.",
            Self::VariableNotFound => "Variable not found.",
            Self::ImageLoadFailed => "Failed to load image.",
            Self::PluginError => "Figma plugin error.",
            Self::PluginNotRunning => "Figma plugin is not running.",
        }
    }
}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code.as_u16()
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_u16() == value)
            .ok_or_else(|| format!("unknown error code {value}"))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}
