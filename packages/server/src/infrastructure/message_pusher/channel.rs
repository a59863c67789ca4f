//! 有界キューを使った MessagePusher 実装
//!
//! ## 責務
//!
//! - 接続ごとの `OutboundQueue` を管理
//! - クライアントへのメッセージ送信（push_to, broadcast）
//! - 満杯のキューを持つクライアントの切り離し
//!
//! ## 設計ノート
//!
//! キューの生成は UI 層（`ui/handler/websocket.rs`）で行われ、受信側は
//! outbound pump が保持します。この実装は送信側だけを保持します。
//!
//! - UI 層: WebSocket 接続の受付、キューの生成、ソケットへの書き込み
//! - Infrastructure 層: キューの管理、非ブロッキングなメッセージ送信

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ConnectionId, MessagePushError, MessagePusher, OutboundQueue};

/// 有界キューを使った MessagePusher 実装
///
/// ## フィールド
///
/// - `clients`: 接続中のクライアントと対応する送信キューのマップ
///
/// ## 使用例
///
/// ```ignore
/// let pusher = ChannelMessagePusher::new();
/// let (queue, rx) = OutboundQueue::bounded(256);
/// pusher.register_client(connection_id, queue).await;
///
/// pusher.push_to(&connection_id, "{\"type\":\"error\",\"message\":\"...\"}").await?;
/// ```
#[derive(Default)]
pub struct ChannelMessagePusher {
    clients: RwLock<HashMap<ConnectionId, OutboundQueue>>,
}

impl ChannelMessagePusher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 応答しないクライアントを登録解除し、キューを閉じる
    async fn drop_client(&self, connection_id: &ConnectionId) {
        if let Some(queue) = self.clients.write().await.remove(connection_id) {
            queue.close();
            tracing::warn!(
                "Client '{}' is unresponsive; queue closed and client dropped",
                connection_id
            );
        }
    }
}

#[async_trait]
impl MessagePusher for ChannelMessagePusher {
    async fn register_client(&self, connection_id: ConnectionId, queue: OutboundQueue) {
        self.clients.write().await.insert(connection_id, queue);
        tracing::debug!("Client '{}' registered to MessagePusher", connection_id);
    }

    async fn unregister_client(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.clients.write().await.remove(connection_id);
        match removed {
            Some(queue) => {
                queue.close();
                tracing::debug!("Client '{}' unregistered from MessagePusher", connection_id);
                true
            }
            None => false,
        }
    }

    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError> {
        let result = {
            let clients = self.clients.read().await;
            match clients.get(connection_id) {
                Some(queue) => queue.try_push(connection_id, content.to_string()),
                None => Err(MessagePushError::ClientNotFound(connection_id.to_string())),
            }
        };

        if let Err(MessagePushError::Unresponsive(_)) = &result {
            self.drop_client(connection_id).await;
        }
        result
    }

    async fn broadcast(&self, targets: &[ConnectionId], content: &str) -> Vec<ConnectionId> {
        let mut dropped = Vec::new();
        let mut unresponsive = Vec::new();
        {
            let clients = self.clients.read().await;
            for target in targets {
                let Some(queue) = clients.get(target) else {
                    tracing::warn!("Client '{}' not found during broadcast, skipping", target);
                    dropped.push(*target);
                    continue;
                };
                // ブロードキャストでは一部の送信失敗を許容
                match queue.try_push(target, content.to_string()) {
                    Ok(()) => {}
                    Err(MessagePushError::Unresponsive(_)) => unresponsive.push(*target),
                    Err(e) => {
                        tracing::debug!("Skipping client '{}': {}", target, e);
                        dropped.push(*target);
                    }
                }
            }
        }

        for target in unresponsive {
            self.drop_client(&target).await;
            dropped.push(target);
        }
        dropped
    }

    async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }
}
