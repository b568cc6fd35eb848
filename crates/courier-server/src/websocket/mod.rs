//! WebSocket connection registry, per-connection loops and built-in event handling.

pub mod connection;
pub mod handler;
pub mod hub;
pub mod session;
