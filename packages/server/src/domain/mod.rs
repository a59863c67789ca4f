//! Domain 層
//!
//! エンティティ・値オブジェクトと、外側の層が実装する trait を定義します。

pub mod connection;
pub mod entity;
pub mod error;
pub mod message_pusher;
pub mod rate_limiter;
pub mod repository;
pub mod room;
pub mod value_object;

pub use connection::{Connection, ConnectionState};
pub use entity::{ChatMessage, Member, MessageDraft, MessageKind};
pub use error::{MessagePushError, StorageError, ValueObjectError};
pub use message_pusher::{MessagePusher, OutboundQueue};
pub use rate_limiter::{RateLimiter, TokenBucket};
pub use repository::{DurableStore, RoomRegistry};
#[cfg(test)]
pub use repository::MockDurableStore;
pub use room::{Room, RoomState};
pub use value_object::{ConnectionId, MessageId, Payload, RoomId, Timestamp, UserId};
