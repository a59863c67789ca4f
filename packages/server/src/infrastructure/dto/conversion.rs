//! Conversion logic between DTOs and domain entities.

use thiserror::Error;

use roomcast_shared::time::{parse_rfc3339, timestamp_to_rfc3339};

use crate::domain::{
    entity::{self, MessageKind},
    value_object::{MessageId, Payload, RoomId, Timestamp},
};
use crate::infrastructure::dto::websocket::{self as dto, ErrorMessage, MessageType};

/// A DTO that does not describe a valid domain message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ConversionError {
    pub field: &'static str,
    pub reason: String,
}

impl ConversionError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

// ========================================
// DTO → Domain Entity
// ========================================

impl TryFrom<dto::ChatMessage> for entity::ChatMessage {
    type Error = ConversionError;

    fn try_from(dto: dto::ChatMessage) -> Result<Self, Self::Error> {
        let kind = match dto.r#type {
            MessageType::Message => MessageKind::Message,
            MessageType::UserJoined => MessageKind::UserJoined,
            MessageType::UserLeft => MessageKind::UserLeft,
            other => return Err(ConversionError::new("type", format!("{:?}", other))),
        };
        let room_id =
            RoomId::new(dto.room).map_err(|e| ConversionError::new("room", e.to_string()))?;
        let timestamp = parse_rfc3339(&dto.timestamp)
            .map(Timestamp::new)
            .ok_or_else(|| ConversionError::new("timestamp", dto.timestamp.clone()))?;
        let message_id = dto
            .message_id
            .map(MessageId::new)
            .transpose()
            .map_err(|e| ConversionError::new("message_id", e.to_string()))?;
        let expires_at = dto
            .expires_at
            .map(|value| {
                parse_rfc3339(&value)
                    .map(Timestamp::new)
                    .ok_or_else(|| ConversionError::new("expires_at", value))
            })
            .transpose()?;

        Ok(Self {
            kind,
            room_id,
            user: dto.user,
            payload: Payload::new(dto.encrypted),
            iv: dto.iv,
            timestamp,
            message_id,
            expires_at,
            size: dto.size,
        })
    }
}

// ========================================
// Domain Entity → DTO
// ========================================

impl From<&entity::ChatMessage> for dto::ChatMessage {
    fn from(model: &entity::ChatMessage) -> Self {
        let r#type = match model.kind {
            MessageKind::Message => MessageType::Message,
            MessageKind::UserJoined => MessageType::UserJoined,
            MessageKind::UserLeft => MessageType::UserLeft,
        };
        Self {
            r#type,
            room: model.room_id.as_str().to_string(),
            user: model.user.clone(),
            encrypted: model.payload.as_str().to_string(),
            iv: model.iv.clone(),
            timestamp: timestamp_to_rfc3339(model.timestamp.value()),
            message_id: model.message_id.as_ref().map(|id| id.as_str().to_string()),
            expires_at: model.expires_at.map(|at| timestamp_to_rfc3339(at.value())),
            size: model.size,
        }
    }
}

/// Serialize a message into one outbound text frame
pub fn encode_message(message: &entity::ChatMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(&dto::ChatMessage::from(message))
}

/// Serialize an error frame for the originating connection
pub fn encode_error(reason: impl Into<String>) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ErrorMessage::new(reason))
}

/// Decode a stored blob back into a domain message
pub fn decode_message(blob: &str) -> Result<entity::ChatMessage, ConversionError> {
    let dto: dto::ChatMessage =
        serde_json::from_str(blob).map_err(|e| ConversionError::new("json", e.to_string()))?;
    dto.try_into()
}
