//! WebSocket frame DTOs.
//!
//! Every frame is one JSON object in one text message.

use serde::{Deserialize, Serialize};

/// Value of the `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Inbound: join a room
    Join,
    /// Inbound and outbound: opaque data
    Message,
    /// Outbound: somebody joined
    UserJoined,
    /// Outbound: somebody left
    UserLeft,
    /// Outbound: request from this connection failed
    Error,
    /// Anything else; dropped on receipt
    #[serde(other)]
    Unknown,
}

/// Frame received from a client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundMessage {
    pub r#type: MessageType,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub encrypted: String,
    #[serde(default)]
    pub iv: String,
    /// Client clock, ISO-8601; informational only
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Frame delivered to room members, also the stored blob format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub r#type: MessageType,
    pub room: String,
    pub user: String,
    pub encrypted: String,
    pub iv: String,
    /// RFC 3339
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// RFC 3339
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub size: usize,
}

/// Sent only to the connection whose request failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub r#type: MessageType,
    pub message: String,
}

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            r#type: MessageType::Error,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_join_without_optional_fields() {
        // テスト項目: 省略可能なフィールドがない join フレームを解析できる
        // given (前提条件):
        let json = r#"{"type":"join","room":"r1","user":"alice"}"#;

        // when (操作):
        let frame: InboundMessage = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(frame.r#type, MessageType::Join);
        assert_eq!(frame.room, "r1");
        assert_eq!(frame.user, "alice");
        assert!(frame.encrypted.is_empty());
        assert!(frame.timestamp.is_none());
    }

    #[test]
    fn test_inbound_unknown_type() {
        // テスト項目: 未知の type は Unknown として解析される
        // given (前提条件):
        let json = r#"{"type":"typing","room":"r1"}"#;

        // when (操作):
        let frame: InboundMessage = serde_json::from_str(json).unwrap();

        // then (期待する結果):
        assert_eq!(frame.r#type, MessageType::Unknown);
    }

    #[test]
    fn test_control_frame_omits_message_fields() {
        // テスト項目: 制御フレームには message_id と expires_at が含まれない
        // given (前提条件):
        let frame = ChatMessage {
            r#type: MessageType::UserJoined,
            room: "r1".to_string(),
            user: "bob".to_string(),
            encrypted: String::new(),
            iv: String::new(),
            timestamp: "2023-01-01T00:00:00.000Z".to_string(),
            message_id: None,
            expires_at: None,
            size: 0,
        };

        // when (操作):
        let json = serde_json::to_value(&frame).unwrap();

        // then (期待する結果):
        assert_eq!(json["type"], "user_joined");
        assert!(json.get("message_id").is_none());
        assert!(json.get("expires_at").is_none());
    }

    #[test]
    fn test_error_frame_shape() {
        // テスト項目: エラーフレームは type と message を持つ
        // given (前提条件):
        let frame = ErrorMessage::new("rate limit exceeded");

        // when (操作):
        let json = serde_json::to_string(&frame).unwrap();

        // then (期待する結果):
        assert_eq!(json, r#"{"type":"error","message":"rate limit exceeded"}"#);
    }
}
