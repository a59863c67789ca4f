//! MessagePusher trait 定義
//!
//! 接続中のクライアントへメッセージを届けるためのインターフェース。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::{error::MessagePushError, value_object::ConnectionId};

/// 1 接続分の上限付き送信キュー
///
/// 複製したハンドルは同じ送信側を共有する。[`OutboundQueue::close`] で送信側を破棄すると
/// 受信側のポンプはストリームの終端を受け取る。閉じるのは 1 回だけ。
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    sender: Arc<Mutex<Option<mpsc::Sender<String>>>>,
}

impl OutboundQueue {
    /// 最大 `capacity` 件のフレームを保持するキューを作成
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// 待たずにキューへ積む
    ///
    /// 満杯なら [`MessagePushError::Unresponsive`] を返す。キュー自体には触れず、
    /// 何を切り離すかは呼び出し側が決める
    pub fn try_push(&self, owner: &ConnectionId, frame: String) -> Result<(), MessagePushError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(MessagePushError::Closed(owner.to_string()));
        };
        sender.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => MessagePushError::Unresponsive(owner.to_string()),
            TrySendError::Closed(_) => MessagePushError::Closed(owner.to_string()),
        })
    }

    /// キューを閉じる。実際に閉じた呼び出しだけが `true` を返す
    pub fn close(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|sender| sender.is_closed())
    }
}

/// MessagePusher trait
///
/// UseCase 層はこの trait に依存し、送信キューの管理方法には依存しない。
///
/// 送信は決してブロックしない。キューが満杯のクライアントは応答なしとみなされ、
/// 登録解除されてキューが閉じられる。
#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// クライアントの送信キューを登録
    async fn register_client(&self, connection_id: ConnectionId, queue: OutboundQueue);

    /// クライアントを登録解除し、送信キューを閉じる
    ///
    /// 既に登録解除されていた場合は `false` を返す（冪等）
    async fn unregister_client(&self, connection_id: &ConnectionId) -> bool;

    /// 特定のクライアントにメッセージを送信
    async fn push_to(
        &self,
        connection_id: &ConnectionId,
        content: &str,
    ) -> Result<(), MessagePushError>;

    /// 複数のクライアントにメッセージをブロードキャスト
    ///
    /// 部分的な失敗は許容され、届けられなかった（切り離された）クライアントの
    /// ID リストを返す
    async fn broadcast(&self, targets: &[ConnectionId], content: &str) -> Vec<ConnectionId>;

    /// 登録中のクライアント数
    async fn client_count(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_push_delivers_frame() {
        // テスト項目: キューに空きがあればフレームが届く
        // given (前提条件):
        let (queue, mut rx) = OutboundQueue::bounded(4);
        let owner = ConnectionId::generate();

        // when (操作):
        let result = queue.try_push(&owner, "hello".to_string());

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(rx.recv().await, Some("hello".to_string()));
    }

    #[tokio::test]
    async fn test_try_push_on_full_queue_is_unresponsive() {
        // テスト項目: 満杯のキューへの送信はブロックせず Unresponsive を返す
        // given (前提条件):
        let (queue, _rx) = OutboundQueue::bounded(1);
        let owner = ConnectionId::generate();
        queue.try_push(&owner, "first".to_string()).unwrap();

        // when (操作):
        let result = queue.try_push(&owner, "second".to_string());

        // then (期待する結果):
        assert_eq!(result, Err(MessagePushError::Unresponsive(owner.to_string())));
    }

    #[tokio::test]
    async fn test_close_happens_once_and_ends_stream() {
        // テスト項目: close は一度だけ成功し、受信側はストリーム終端を受け取る
        // given (前提条件):
        let (queue, mut rx) = OutboundQueue::bounded(4);
        let clone = queue.clone();
        let owner = ConnectionId::generate();

        // when (操作):
        let first = queue.close();
        let second = clone.close();

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert!(clone.is_closed());
        assert_eq!(rx.recv().await, None);
        assert_eq!(
            clone.try_push(&owner, "late".to_string()),
            Err(MessagePushError::Closed(owner.to_string()))
        );
    }
}
