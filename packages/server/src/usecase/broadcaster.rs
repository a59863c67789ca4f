//! Broadcaster
//!
//! サーバー全体で 1 つだけ作られ、全ての接続ハンドラに共有されるコンテキスト。
//! ルームの参加・退出・送信（`join_room.rs` / `leave_room.rs` / `send_message.rs`）
//! はこの型のメソッドとして実装されている。
//!
//! ## ロック順序
//!
//! レジストリ → ルーム → MessagePusher。ルームのロックを持ったままレジストリの
//! ロックを取ってはならない（空になったルームの削除はルームのロックを解放してから行う）。

use std::sync::Arc;

use roomcast_shared::time::Clock;

use crate::{
    config::MessageConfig,
    domain::{
        ChatMessage, Connection, ConnectionId, MessagePusher, RateLimiter, RoomId, RoomRegistry,
        RoomState, Timestamp,
    },
    infrastructure::dto::conversion::encode_message,
};

use super::history::HistoryStore;

pub struct Broadcaster {
    pub(super) registry: Arc<dyn RoomRegistry>,
    pub(super) pusher: Arc<dyn MessagePusher>,
    pub(super) history: Arc<HistoryStore>,
    pub(super) rate_limiter: Arc<RateLimiter>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) config: MessageConfig,
}

impl Broadcaster {
    pub fn new(
        registry: Arc<dyn RoomRegistry>,
        pusher: Arc<dyn MessagePusher>,
        history: Arc<HistoryStore>,
        rate_limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        config: MessageConfig,
    ) -> Self {
        Self {
            registry,
            pusher,
            history,
            rate_limiter,
            clock,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<dyn RoomRegistry> {
        &self.registry
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// 新しい接続の送信キューを登録し、フレームを受け取れるようにする
    pub async fn attach(&self, connection: &Connection) {
        self.pusher
            .register_client(connection.id(), connection.outbound().clone())
            .await;
        tracing::debug!("Connection {} attached", connection.id());
    }

    /// 1 つの接続にだけフレームを積む（エラー応答用）
    pub async fn reply(&self, connection_id: &ConnectionId, frame: &str) {
        if let Err(e) = self.pusher.push_to(connection_id, frame).await {
            tracing::debug!("Dropped reply to {}: {}", connection_id, e);
        }
    }

    /// ルームの最新 `limit` 件を古い順で返す
    pub async fn recent(&self, room_id: &RoomId, limit: usize) -> Vec<ChatMessage> {
        let room = self.registry.get(room_id).await;
        self.history.recent(room_id, room.as_deref(), limit).await
    }

    pub async fn room_count(&self) -> usize {
        self.registry.room_count().await
    }

    pub async fn connection_count(&self) -> usize {
        self.pusher.client_count().await
    }

    /// ルームの参加者数（ルームがなければ 0）
    pub async fn member_count(&self, room_id: &RoomId) -> usize {
        match self.registry.get(room_id).await {
            Some(room) => room.member_count().await,
            None => 0,
        }
    }

    pub(super) fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// `targets` に `frame` を待たずに積む
    ///
    /// ルームのロックを持ったまま呼ぶこと。受け取れなかった宛先はルームから外される
    /// （キューは MessagePusher が既に閉じている）
    pub(super) async fn fan_out(
        &self,
        room_id: &RoomId,
        state: &mut RoomState,
        targets: &[ConnectionId],
        frame: &str,
    ) {
        let dropped = self.pusher.broadcast(targets, frame).await;
        for connection_id in dropped {
            if let Some(member) = state.remove_member(&connection_id) {
                tracing::warn!(
                    "Dropped unresponsive member '{}' ({}) from room {}",
                    member.display_name,
                    connection_id,
                    room_id
                );
            }
        }
    }

    /// 空ならルームを削除する。ルームのロックを持たずに呼ぶこと
    pub(super) async fn evict_if_empty(&self, room_id: &RoomId) {
        if self.registry.remove(room_id).await {
            tracing::info!("Room {} is empty and was evicted", room_id);
        }
    }
}

/// ファンアウト用にメッセージを 1 回だけシリアライズ
pub(super) fn encode(message: &ChatMessage) -> Option<String> {
    match encode_message(message) {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!("Failed to encode message for room {}: {}", message.room_id, e);
            None
        }
    }
}
