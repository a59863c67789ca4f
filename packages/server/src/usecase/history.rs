//! 2 層のメッセージ履歴
//!
//! 任意の永続層に先に書き、先に読む。ルーム自身の上限付きバッファには常に書き、
//! 永続層が答えられない読み出しを受け持つ。永続層の失敗はログに残すだけで呼び出し側には返さない。

use std::{sync::Arc, time::Duration};

use roomcast_shared::time::Clock;

use crate::{
    config::MessageConfig,
    domain::{ChatMessage, DurableStore, Room, RoomId, RoomState, StorageError, Timestamp},
};

pub struct HistoryStore {
    durable: Option<Arc<dyn DurableStore>>,
    clock: Arc<dyn Clock>,
    message_ttl: Duration,
    max_room_messages: usize,
}

impl HistoryStore {
    pub fn new(
        durable: Option<Arc<dyn DurableStore>>,
        clock: Arc<dyn Clock>,
        config: &MessageConfig,
    ) -> Self {
        Self {
            durable,
            clock,
            message_ttl: config.message_ttl,
            max_room_messages: config.max_room_messages,
        }
    }

    /// 永続層が設定されているか
    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// 受理したメッセージを保存する
    ///
    /// ルームのロックを持ったまま呼ぶので、履歴の順序はファンアウトの順序と一致する
    pub async fn persist(&self, state: &mut RoomState, message: &ChatMessage) {
        if let Some(durable) = &self.durable {
            if let Err(e) = durable
                .store(message, self.message_ttl, self.max_room_messages)
                .await
            {
                tracing::warn!(
                    "Durable write failed for room {}, keeping message in memory only: {}",
                    message.room_id,
                    e
                );
            }
        }
        state.append_history(message.clone());
    }

    /// ルームの期限切れでない最新 `limit` 件を古い順で返す
    ///
    /// `memory` は存在する場合のルーム。なければ永続層だけが答えられる
    pub async fn recent(
        &self,
        room_id: &RoomId,
        memory: Option<&Room>,
        limit: usize,
    ) -> Vec<ChatMessage> {
        let now = Timestamp::new(self.clock.now_millis());

        if let Some(durable) = &self.durable {
            match durable.recent(room_id, limit).await {
                Ok(messages) => {
                    let live: Vec<ChatMessage> = messages
                        .into_iter()
                        .filter(|message| !message.is_expired(now))
                        .collect();
                    if !live.is_empty() {
                        return live;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Durable read failed for room {}, falling back to memory: {}",
                        room_id,
                        e
                    );
                }
            }
        }

        match memory {
            Some(room) => room.recent_history(limit, now).await,
            None => Vec::new(),
        }
    }

    /// メッセージが失効した永続層のインデックスを掃除する
    pub async fn prune_expired(&self) -> Result<usize, StorageError> {
        match &self.durable {
            Some(durable) => durable.prune_dangling().await,
            None => Ok(0),
        }
    }
}
