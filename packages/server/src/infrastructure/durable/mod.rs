//! 永続層（履歴）の実装
//!
//! どちらの実装も同じキー構成を使う:
//!
//! - `msg:{room}:{message_id}`: エンコード済みメッセージ 1 件。メッセージの TTL で失効する
//! - `room:{room}:messages`: 到着時刻（ミリ秒）をスコアとするメッセージ ID の順序付きインデックス。
//! 書き込みのたびに有効期限を延長する

pub mod inmemory;
pub mod redis_store;

pub use inmemory::InMemoryDurableStore;
pub use redis_store::RedisDurableStore;

use crate::domain::RoomId;

const INDEX_PREFIX: &str = "room:";
const INDEX_SUFFIX: &str = ":messages";

/// 全ルームのインデックスキーに一致する glob
pub const INDEX_KEY_PATTERN: &str = "room:*:messages";

pub fn message_key(room_id: &RoomId, message_id: &str) -> String {
    format!("msg:{}:{}", room_id, message_id)
}

pub fn index_key(room_id: &RoomId) -> String {
    format!("{}{}{}", INDEX_PREFIX, room_id, INDEX_SUFFIX)
}

/// インデックスキーに含まれるルーム ID
pub fn room_of_index_key(key: &str) -> Option<&str> {
    key.strip_prefix(INDEX_PREFIX)?.strip_suffix(INDEX_SUFFIX)
}
