//! WebSocket transport glue between axum and the broker.

pub mod session;

pub use session::run_ws_session;
