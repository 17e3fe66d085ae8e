//! # pilot-core
//!
//! Shared vocabulary for the Figma Pilot relay:
//!
//! - **Branded IDs**: [`ConnectionId`] for transport endpoints, [`RequestId`]
//!   for command correlation
//! - **Wire frames**: [`Frame`] covering `join`/`leave`/`message`/`broadcast`/`ping`/`pong`
//! - **Envelopes**: [`CommandEnvelope`] sent to the plugin, [`ResponseEnvelope`]
//!   sent back
//! - **Errors**: [`RelayError`] for command/startup failures, [`FrameError`] for
//!   inbound parse failures, [`ErrorCode`] numeric families, and plugin error
//!   classification

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod protocol;

pub use errors::codes::ErrorCode;
pub use errors::parse::{PluginError, classify_plugin_error};
pub use errors::{FrameError, RelayError};
pub use ids::{ConnectionId, RequestId};
pub use protocol::{CommandEnvelope, Frame, ResponseEnvelope};
