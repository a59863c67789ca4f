//! Static configuration consumed by the broadcast engine.
//!
//! Values are supplied once at startup (see `src/bin/server.rs`) and never
//! re-derived. Defaults match the production deployment.

use std::time::Duration;

/// Message validation and retention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageConfig {
    /// Maximum payload size in bytes
    pub max_message_size: usize,
    /// Lifetime of a stored message
    pub message_ttl: Duration,
    /// Messages per minute per sender (also the bucket capacity)
    pub rate_limit_per_minute: u32,
    /// Maximum messages kept per room in the durable tier
    pub max_room_messages: usize,
    /// Maximum messages kept per room in memory
    pub memory_history_capacity: usize,
    /// How many history messages a new member receives
    pub join_history_limit: usize,
    /// Name given to rooms created on join
    pub default_room_name: String,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            max_message_size: 4096,
            message_ttl: Duration::from_secs(24 * 60 * 60),
            rate_limit_per_minute: 30,
            max_room_messages: 1000,
            memory_history_capacity: 100,
            join_history_limit: 50,
            default_room_name: "Chat Room".to_string(),
        }
    }
}

/// Per-connection transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Outbound queue slots per connection
    pub outbound_queue_capacity: usize,
    /// Interval between keepalive pings
    pub keepalive_interval: Duration,
    /// Deadline for a single write or flush
    pub write_timeout: Duration,
    /// Maximum silence from the peer before the connection is dropped
    pub pong_wait: Duration,
    /// Largest inbound WebSocket message accepted
    pub max_frame_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            keepalive_interval: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            max_frame_size: 64 * 1024,
        }
    }
}

/// Background sweep cadence and thresholds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaperConfig {
    pub idle_room_interval: Duration,
    pub idle_room_max_age: Duration,
    pub history_interval: Duration,
    pub limiter_interval: Duration,
    pub limiter_max_idle: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            idle_room_interval: Duration::from_secs(30 * 60),
            idle_room_max_age: Duration::from_secs(24 * 60 * 60),
            history_interval: Duration::from_secs(60 * 60),
            limiter_interval: Duration::from_secs(60 * 60),
            limiter_max_idle: Duration::from_secs(24 * 60 * 60),
        }
    }
}
