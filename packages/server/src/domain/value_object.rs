//! Value Objects
//!
//! 識別子やタイムスタンプなど、不変で値として比較されるドメインの型を定義します。

use std::{fmt, time::Duration};

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use roomcast_shared::time::duration_to_millis;

use super::error::ValueObjectError;

/// ルーム ID の最大長（文字数）
pub const ROOM_ID_MAX_LEN: usize = 128;

/// メッセージ ID の最大長（文字数）
pub const MESSAGE_ID_MAX_LEN: usize = 128;

fn validate(field: &'static str, value: &str, max: usize) -> Result<(), ValueObjectError> {
    if value.trim().is_empty() {
        return Err(ValueObjectError::Empty(field));
    }
    let actual = value.chars().count();
    if actual > max {
        return Err(ValueObjectError::TooLong { field, max, actual });
    }
    Ok(())
}

/// ルーム ID（呼び出し側が指定する文字列）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        validate("room id", &value, ROOM_ID_MAX_LEN)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ユーザー ID
///
/// レート制限のバケットを識別する。参加ごとにサーバーが発行し
/// （`user-` + ランダムな接尾辞）、再接続をまたいでは引き継がれない。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// 新しいセッション用ユーザー ID を発行
    pub fn generate() -> Self {
        Self(format!("user-{}", random_suffix(12)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 接続 ID（トランスポートのセッション 1 本）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// メッセージ ID
///
/// ミリ秒単位の時刻（`YYYYMMDDhhmmssSSS`）に 48 bit の乱数を続ける。
/// 到着順に並び、同じミリ秒内の同時送信でも衝突しない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    pub fn generate(at: Timestamp) -> Self {
        let prefix = Utc
            .timestamp_millis_opt(at.value())
            .single()
            .unwrap_or_default()
            .format("%Y%m%d%H%M%S%3f");
        Self(format!("{}-{}", prefix, random_suffix(12)))
    }

    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        validate("message id", &value, MESSAGE_ID_MAX_LEN)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unix タイムスタンプ（UTC, ミリ秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration_to_millis(duration)))
    }

    /// `earlier` からの経過時間（`earlier` が未来なら 0）
    pub fn elapsed_since(self, earlier: Timestamp) -> Duration {
        Duration::from_millis(u64::try_from(self.0 - earlier.0).unwrap_or(0))
    }
}

/// 不透明な暗号文
///
/// 中身は見ない。サーバーが気にするのはバイト数だけ。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload(String);

impl Payload {
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// バイト数
    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn random_suffix(len: usize) -> String {
    let mut hex = Uuid::new_v4().simple().to_string();
    hex.truncate(len);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_room_id_rejects_empty() {
        // テスト項目: 空白のみのルーム ID はエラーになる
        // given (前提条件):
        let value = "   ".to_string();

        // when (操作):
        let result = RoomId::new(value);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::Empty("room id")));
    }

    #[test]
    fn test_room_id_rejects_too_long() {
        // テスト項目: 最大長を超えるルーム ID はエラーになる
        // given (前提条件):
        let value = "r".repeat(ROOM_ID_MAX_LEN + 1);

        // when (操作):
        let result = RoomId::new(value);

        // then (期待する結果):
        assert!(matches!(result, Err(ValueObjectError::TooLong { .. })));
    }

    #[test]
    fn test_generated_user_ids_are_prefixed_and_unique() {
        // テスト項目: 生成されたユーザー ID は "user-" で始まり、重複しない
        // given (前提条件):
        let count = 1000;

        // when (操作):
        let ids: HashSet<String> = (0..count)
            .map(|_| UserId::generate().as_str().to_string())
            .collect();

        // then (期待する結果):
        assert_eq!(ids.len(), count);
        assert!(ids.iter().all(|id| id.starts_with("user-")));
    }

    #[test]
    fn test_message_ids_within_same_millisecond_do_not_collide() {
        // テスト項目: 同一ミリ秒内に生成したメッセージ ID が衝突しない
        // given (前提条件):
        let at = Timestamp::new(1_672_531_200_123);

        // when (操作):
        let ids: HashSet<MessageId> = (0..1000).map(|_| MessageId::generate(at)).collect();

        // then (期待する結果):
        assert_eq!(ids.len(), 1000);
        assert!(ids.iter().all(|id| id.as_str().starts_with("20230101000000123-")));
    }

    #[test]
    fn test_message_ids_sort_by_time() {
        // テスト項目: メッセージ ID は時刻順に並ぶ
        // given (前提条件):
        let earlier = MessageId::generate(Timestamp::new(1_000));
        let later = MessageId::generate(Timestamp::new(2_000));

        // when (操作):
        let ordered = earlier < later;

        // then (期待する結果):
        assert!(ordered);
    }

    #[test]
    fn test_payload_size_counts_bytes() {
        // テスト項目: ペイロードのサイズはバイト数で数えられる
        // given (前提条件):
        let payload = Payload::new("あい".to_string());

        // when (操作):
        let size = payload.size();

        // then (期待する結果):
        assert_eq!(size, 6);
    }

    #[test]
    fn test_timestamp_elapsed_since_saturates() {
        // テスト項目: 未来の時刻との差は 0 になる
        // given (前提条件):
        let now = Timestamp::new(1_000);
        let future = Timestamp::new(5_000);

        // when (操作):
        let elapsed = now.elapsed_since(future);

        // then (期待する結果):
        assert_eq!(elapsed, Duration::ZERO);
        assert_eq!(future.elapsed_since(now), Duration::from_secs(4));
    }
}
