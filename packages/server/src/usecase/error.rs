//! UseCase 層のエラー定義
//!
//! どのエラーも原因となった接続にだけ、`Display` の文言を持つ `error` フレームとして返す。

use thiserror::Error;

/// Send が失敗した理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// ペイロードが上限を超えている（状態は一切変更されない）
    #[error("message too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// 送信者のトークンが尽きている
    #[error("rate limit exceeded")]
    RateLimited,

    /// ルームが既に存在しない
    #[error("room not found")]
    RoomNotFound,
}

/// Join が失敗した理由
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// 既にルームに参加している接続
    #[error("already joined")]
    AlreadyJoined,

    /// 既に閉じられた接続
    #[error("connection closed")]
    Closed,
}
