//! Infrastructure layer.
//!
//! Concrete implementations of the domain traits plus the wire DTOs.

pub mod dto;
pub mod durable;
pub mod message_pusher;
pub mod repository;
