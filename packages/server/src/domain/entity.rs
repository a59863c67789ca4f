//! Entities
//!
//! ルームを流れるメッセージと、ルームの参加者を表すエンティティ。

use std::time::Duration;

use super::value_object::{MessageId, Payload, RoomId, Timestamp, UserId};

/// ルームのメンバーに配信されるメッセージの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// メンバーが送った不透明なデータ
    Message,
    /// 制御: 誰かがルームに参加した
    UserJoined,
    /// 制御: 誰かがルームから退出した
    UserLeft,
}

/// 送信者がサーバーに渡す内容。それ以外は受信時に付与される
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    /// 送信者が名乗るユーザー名（そのまま転送する）
    pub user: String,
    /// 暗号文
    pub payload: Payload,
    /// 暗号文と一緒に運ばれる初期化ベクトル
    pub iv: String,
}

/// ルームに受理されたメッセージ
///
/// `message_id` と `expires_at` はデータメッセージにだけ付く。制御メッセージは保存されない
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub kind: MessageKind,
    pub room_id: RoomId,
    pub user: String,
    pub payload: Payload,
    pub iv: String,
    pub timestamp: Timestamp,
    pub message_id: Option<MessageId>,
    pub expires_at: Option<Timestamp>,
    pub size: usize,
}

impl ChatMessage {
    /// 下書きに ID・受信時刻・有効期限・サイズを付与する
    pub fn stamp(draft: MessageDraft, room_id: RoomId, now: Timestamp, ttl: Duration) -> Self {
        let size = draft.payload.size();
        Self {
            kind: MessageKind::Message,
            room_id,
            user: draft.user,
            payload: draft.payload,
            iv: draft.iv,
            timestamp: now,
            message_id: Some(MessageId::generate(now)),
            expires_at: Some(now.saturating_add(ttl)),
            size,
        }
    }

    /// `user` についての `user_joined` / `user_left` 通知を作成
    pub fn control(kind: MessageKind, room_id: RoomId, user: String, now: Timestamp) -> Self {
        Self {
            kind,
            room_id,
            user,
            payload: Payload::default(),
            iv: String::new(),
            timestamp: now,
            message_id: None,
            expires_at: None,
            size: 0,
        }
    }

    /// `expires_at` を過ぎていれば期限切れ
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}

/// ルームの参加者
///
/// ルームが持つのはメンバーが誰かだけで、トランスポートはセッション側が所有する
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: UserId,
    pub display_name: String,
    pub joined_at: Timestamp,
}

impl Member {
    pub fn new(user_id: UserId, display_name: String, joined_at: Timestamp) -> Self {
        Self {
            user_id,
            display_name,
            joined_at,
        }
    }
}
