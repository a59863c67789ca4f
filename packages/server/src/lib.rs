//! Real-time ephemeral room broadcast engine.
//!
//! Clients connect over WebSocket, join a named room and exchange opaque
//! (end-to-end encrypted) payloads with every other member. Recent history is
//! kept in memory and, optionally, in Redis with automatic expiry.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
