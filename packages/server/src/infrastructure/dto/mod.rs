//! Data Transfer Objects (DTOs) for the broadcast server.
//!
//! DTOs are organized by protocol:
//! - `websocket`: WebSocket frames (also the durable-tier blob format)
//! - `http`: HTTP API response DTOs

pub mod conversion;
pub mod http;
pub mod websocket;
