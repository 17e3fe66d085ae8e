//! # pilot-relay
//!
//! WebSocket relay between the Figma plugin and the controller.
//!
//! - [`broker`]: endpoints, channel membership, frame dispatch, heartbeat
//! - [`controller`]: channel selection and command/response correlation
//! - [`server`]: axum listener serving `/` (upgrade or banner) and `/health`
//! - [`websocket`]: per-connection read and write loops
//! - [`shutdown`]: cancellation shared by every task

#![deny(unsafe_code)]

pub mod broker;
pub mod config;
pub mod controller;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use broker::{BroadcastTap, FrameOutcome, HeartbeatMonitor, RelayBroker, SweepReport};
pub use config::RelayConfig;
pub use controller::{ControllerSession, SessionStatus};
pub use server::RelayServer;
pub use shutdown::ShutdownCoordinator;
