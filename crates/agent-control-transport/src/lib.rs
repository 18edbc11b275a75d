//! Agent-facing transport for the control plane.
//!
//! Provides the WebSocket endpoint agents connect to, wired into the
//! session registry: registration on accept, one writer task per session,
//! the inbound read loop, and teardown on close.

pub mod websocket;

pub use websocket::{WsState, router};
