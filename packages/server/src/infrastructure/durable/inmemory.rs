//! InMemory Durable Store 実装
//!
//! Redis と同じキー構成・有効期限の振る舞いをプロセス内で再現します。
//! Redis なしでも永続層のコードパスを通したい場合とテストで使用します。

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use roomcast_shared::time::Clock;

use crate::domain::{ChatMessage, DurableStore, RoomId, StorageError, Timestamp};
use crate::infrastructure::dto::conversion::{decode_message, encode_message};

use super::{index_key, message_key, room_of_index_key};

/// 絶対時刻の有効期限を持つ値
#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Timestamp,
}

impl<T> Expiring<T> {
    fn is_live(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

/// `(score, member)` の順序付き集合（Redis の sorted set 相当）
type SortedIndex = BTreeSet<(i64, String)>;

#[derive(Debug, Default)]
struct Keyspace {
    blobs: HashMap<String, Expiring<String>>,
    indexes: HashMap<String, Expiring<SortedIndex>>,
}

impl Keyspace {
    /// 期限切れのキーを全て削除
    fn evict_expired(&mut self, now: Timestamp) {
        self.blobs.retain(|_, blob| blob.is_live(now));
        self.indexes.retain(|_, index| index.is_live(now));
    }
}

/// キーごとの有効期限を持つプロセス内の永続層
pub struct InMemoryDurableStore {
    keyspace: Mutex<Keyspace>,
    clock: Arc<dyn Clock>,
}

impl InMemoryDurableStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
            clock,
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// ルームのインデックスの件数（本体が消えたものも含む）
    pub async fn index_len(&self, room_id: &RoomId) -> usize {
        let now = self.now();
        let mut keyspace = self.keyspace.lock().await;
        keyspace.evict_expired(now);
        keyspace
            .indexes
            .get(&index_key(room_id))
            .map_or(0, |index| index.value.len())
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn store(
        &self,
        message: &ChatMessage,
        ttl: Duration,
        max_room_messages: usize,
    ) -> Result<(), StorageError> {
        let Some(message_id) = message.message_id.as_ref() else {
            return Ok(());
        };
        let blob = encode_message(message).map_err(|e| StorageError::Backend(e.to_string()))?;
        let now = self.now();
        let expires_at = now.saturating_add(ttl);

        let mut keyspace = self.keyspace.lock().await;
        keyspace.evict_expired(now);
        keyspace.blobs.insert(
            message_key(&message.room_id, message_id.as_str()),
            Expiring {
                value: blob,
                expires_at,
            },
        );

        let index = keyspace
            .indexes
            .entry(index_key(&message.room_id))
            .or_insert_with(|| Expiring {
                value: SortedIndex::new(),
                expires_at,
            });
        index.expires_at = expires_at;
        index
            .value
            .retain(|(_, member)| member != message_id.as_str());
        index
            .value
            .insert((message.timestamp.value(), message_id.as_str().to_string()));
        while index.value.len() > max_room_messages {
            index.value.pop_first();
        }

        Ok(())
    }

    async fn recent(&self, room_id: &RoomId, limit: usize) -> Result<Vec<ChatMessage>, StorageError> {
        let now = self.now();
        let mut keyspace = self.keyspace.lock().await;
        keyspace.evict_expired(now);

        let Some(index) = keyspace.indexes.get(&index_key(room_id)) else {
            return Ok(Vec::new());
        };

        let mut messages = Vec::new();
        for (_, member) in index.value.iter().rev().take(limit) {
            let key = message_key(room_id, member);
            let Some(blob) = keyspace.blobs.get(&key) else {
                continue;
            };
            match decode_message(&blob.value) {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!("Skipping corrupt record {}: {}", key, e),
            }
        }
        messages.reverse();
        Ok(messages)
    }

    async fn prune_dangling(&self) -> Result<usize, StorageError> {
        let now = self.now();
        let mut keyspace = self.keyspace.lock().await;
        keyspace.evict_expired(now);

        let Keyspace { blobs, indexes } = &mut *keyspace;
        let mut removed = 0;
        for (key, index) in indexes.iter_mut() {
            let Some(room_id) = room_of_index_key(key).and_then(|room| RoomId::new(room.to_string()).ok())
            else {
                continue;
            };
            let before = index.value.len();
            index
                .value
                .retain(|(_, member)| blobs.contains_key(&message_key(&room_id, member)));
            removed += before - index.value.len();
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageDraft, Payload};
    use roomcast_shared::time::ManualClock;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - 保存したメッセージが古い順で取り出せること
    // - インデックスが上限件数まで新しいものだけ残すこと
    // - 有効期限切れのメッセージが読み出されないこと
    // - 本体が消えたインデックスエントリが掃除されること
    // ========================================

    const HOUR: Duration = Duration::from_secs(3600);

    fn create_test_store() -> (InMemoryDurableStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        (InMemoryDurableStore::new(clock.clone()), clock)
    }

    fn room_id() -> RoomId {
        RoomId::new("r1".to_string()).unwrap()
    }

    fn message(clock: &ManualClock, text: &str) -> ChatMessage {
        ChatMessage::stamp(
            MessageDraft {
                user: "alice".to_string(),
                payload: Payload::new(text.to_string()),
                iv: format!("iv-{}", text),
            },
            room_id(),
            Timestamp::new(clock.now_millis()),
            24 * HOUR,
        )
    }

    #[tokio::test]
    async fn test_recent_returns_oldest_first() {
        // テスト項目: 最新 N 件が古い順に返される
        // given (前提条件):
        let (store, clock) = create_test_store();
        for text in ["a", "b", "c"] {
            store.store(&message(&clock, text), 24 * HOUR, 1000).await.unwrap();
            clock.advance(Duration::from_millis(5));
        }

        // when (操作):
        let recent = store.recent(&room_id(), 2).await.unwrap();

        // then (期待する結果):
        let payloads: Vec<&str> = recent.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, vec!["b", "c"]);
        assert_eq!(recent[1].iv, "iv-c");
    }

    #[tokio::test]
    async fn test_index_keeps_newest_entries_only() {
        // テスト項目: インデックスは上限件数を超えると古いものから削られる
        // given (前提条件):
        let (store, clock) = create_test_store();

        // when (操作):
        for i in 0..5 {
            store
                .store(&message(&clock, &i.to_string()), 24 * HOUR, 3)
                .await
                .unwrap();
            clock.advance(Duration::from_millis(1));
        }

        // then (期待する結果):
        let recent = store.recent(&room_id(), 10).await.unwrap();
        let payloads: Vec<&str> = recent.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, vec!["2", "3", "4"]);
        assert_eq!(store.index_len(&room_id()).await, 3);
    }

    #[tokio::test]
    async fn test_expired_blobs_are_skipped() {
        // テスト項目: 有効期限が切れたメッセージは読み出されない
        // given (前提条件):
        let (store, clock) = create_test_store();
        store.store(&message(&clock, "old"), 24 * HOUR, 1000).await.unwrap();
        clock.advance(23 * HOUR);
        store.store(&message(&clock, "new"), 24 * HOUR, 1000).await.unwrap();
        clock.advance(2 * HOUR);

        // when (操作):
        let recent = store.recent(&room_id(), 10).await.unwrap();

        // then (期待する結果):
        let payloads: Vec<&str> = recent.iter().map(|m| m.payload.as_str()).collect();
        assert_eq!(payloads, vec!["new"]);
    }

    #[tokio::test]
    async fn test_prune_dangling_removes_vanished_members() {
        // テスト項目: 本体が期限切れになったインデックスエントリが削除される
        // given (前提条件):
        let (store, clock) = create_test_store();
        store.store(&message(&clock, "old"), 24 * HOUR, 1000).await.unwrap();
        clock.advance(23 * HOUR);
        store.store(&message(&clock, "new"), 24 * HOUR, 1000).await.unwrap();
        clock.advance(2 * HOUR);
        assert_eq!(store.index_len(&room_id()).await, 2);

        // when (操作):
        let removed = store.prune_dangling().await.unwrap();
        let removed_again = store.prune_dangling().await.unwrap();

        // then (期待する結果):
        assert_eq!(removed, 1);
        assert_eq!(removed_again, 0);
        assert_eq!(store.index_len(&room_id()).await, 1);
    }

    #[tokio::test]
    async fn test_control_messages_are_not_stored() {
        // テスト項目: 制御メッセージ（入退室通知）は保存されない
        // given (前提条件):
        let (store, clock) = create_test_store();
        let control = ChatMessage::control(
            crate::domain::MessageKind::UserJoined,
            room_id(),
            "alice".to_string(),
            Timestamp::new(clock.now_millis()),
        );

        // when (操作):
        store.store(&control, 24 * HOUR, 1000).await.unwrap();

        // then (期待する結果):
        assert!(store.recent(&room_id(), 10).await.unwrap().is_empty());
        assert_eq!(store.index_len(&room_id()).await, 0);
    }
}
