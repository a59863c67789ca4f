//! Domain 層のエラー定義

use thiserror::Error;

/// Value Object の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    /// 空文字列は許可されない
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// 最大長を超えている
    #[error("{field} must be at most {max} characters (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

/// 永続層のエラー
///
/// クライアントには返さない。呼び出し側はログに残してメモリ層で続行する
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// 永続層が未設定、またはバックエンドに接続できない
    #[error("durable storage unavailable: {0}")]
    Unavailable(String),

    /// バックエンドがエラーを返した
    #[error("durable storage backend error: {0}")]
    Backend(String),

    /// 保存済みのデータを復元できない
    #[error("corrupt record '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// メッセージ送信（通知）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    /// 送信先のクライアントが登録されていない
    #[error("Client '{0}' not found")]
    ClientNotFound(String),

    /// 送信キューが満杯（応答しないクライアント）
    #[error("Client '{0}' is unresponsive")]
    Unresponsive(String),

    /// 送信キューが既に閉じられている
    #[error("Client '{0}' queue is closed")]
    Closed(String),
}
