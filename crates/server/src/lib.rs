//! HTTP and WebSocket transport for trove.

pub mod api;
pub mod metrics;
pub mod state;
