//! UseCase: メッセージ送信処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - Broadcaster::send() メソッド
//! - サイズ検証 → レート制限 → 採番 → 履歴保存 → 全メンバーへのファンアウト
//!
//! ### なぜこのテストが必要か
//! - 送信者を含む全メンバーに同じ順序で届くことを保証
//! - サイズ超過・レート制限が状態を変えずに拒否されることを確認
//! - 応答しないメンバーが他のメンバーに影響しないことを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：2 人のルームでの送信（シナリオ A 後半）
//! - 異常系：ペイロード超過、レート制限、存在しないルーム
//! - エッジケース：ちょうど上限サイズのペイロード、キューが満杯のメンバー

use crate::domain::{ChatMessage, MessageDraft, RoomId, UserId};

use super::{
    broadcaster::{Broadcaster, encode},
    error::SendError,
};

impl Broadcaster {
    /// メッセージを送信する
    ///
    /// # Returns
    ///
    /// * `Ok(ChatMessage)` - 採番済みのメッセージ
    /// * `Err(SendError)` - 送信失敗（送信者にのみ通知される）
    pub async fn send(
        &self,
        room_id: &RoomId,
        draft: MessageDraft,
        sender: &UserId,
    ) -> Result<ChatMessage, SendError> {
        let size = draft.payload.size();
        let max = self.config.max_message_size;
        if size > max {
            return Err(SendError::PayloadTooLarge { size, max });
        }

        if !self.rate_limiter.allow(sender).await {
            return Err(SendError::RateLimited);
        }

        let room = self
            .registry
            .get(room_id)
            .await
            .ok_or(SendError::RoomNotFound)?;

        let mut state = room.lock().await;
        if state.is_evicted() {
            return Err(SendError::RoomNotFound);
        }

        let message =
            ChatMessage::stamp(draft, room_id.clone(), self.now(), self.config.message_ttl);
        self.history.persist(&mut state, &message).await;

        if let Some(frame) = encode(&message) {
            let targets = state.member_ids();
            self.fan_out(room_id, &mut state, &targets, &frame).await;
        }
        let empty = state.is_empty();
        drop(state);

        if empty {
            self.evict_if_empty(room_id).await;
        }

        tracing::debug!(
            "Accepted message {} ({} bytes) in room {}",
            message
                .message_id
                .as_ref()
                .map_or("-", |id| id.as_str()),
            message.size,
            room_id
        );
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        config::MessageConfig,
        domain::{MessageDraft, Payload, RoomId, UserId},
        infrastructure::dto::websocket::MessageType,
        usecase::{broadcaster::test_support::*, error::SendError},
    };

    fn room_id(id: &str) -> RoomId {
        RoomId::new(id.to_string()).unwrap()
    }

    fn draft(payload: &str) -> MessageDraft {
        MessageDraft {
            user: "alice".to_string(),
            payload: Payload::new(payload.to_string()),
            iv: "0123456789abcdef".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_reaches_every_member_including_sender() {
        // テスト項目: 送信したメッセージが送信者を含む全メンバーに message_id 付きで届く
        // given (前提条件):
        let fixture = create_test_broadcaster(MessageConfig::default());
        let broadcaster = &fixture.broadcaster;
        let (alice, mut rx_alice) = join_as(broadcaster, "r1", "alice").await;
        let (_bob, mut rx_bob) = join_as(broadcaster, "r1", "bob").await;
        settle().await;
        drain(&mut rx_alice);
        drain(&mut rx_bob);

        // when (操作):
        let sent = broadcaster
            .send(&room_id("r1"), draft("P1"), alice.user_id().unwrap())
            .await
            .unwrap();

        // then (期待する結果):
        let message_id = sent.message_id.as_ref().unwrap().as_str().to_string();
        for frames in [drain(&mut rx_alice), drain(&mut rx_bob)] {
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].r#type, MessageType::Message);
            assert_eq!(frames[0].encrypted, "P1");
            assert_eq!(frames[0].iv, "0123456789abcdef");
            assert_eq!(frames[0].message_id.as_deref(), Some(message_id.as_str()));
            assert_eq!(frames[0].size, 2);
        }
    }

    #[tokio::test]
    async fn test_payload_at_exact_limit_is_accepted() {
        // テスト項目: 上限ちょうどのペイロードは受け付けられ、1 バイト超過は拒否される
        // given (前提条件):
        let fixture = create_test_broadcaster(MessageConfig::default());
        let broadcaster = &fixture.broadcaster;
        let (alice, _rx) = join_as(broadcaster, "r1", "alice").await;
        let sender = alice.user_id().unwrap();

        // when (操作):
        let exact = broadcaster
            .send(&room_id("r1"), draft(&"a".repeat(4096)), sender)
            .await;
        let over = broadcaster
            .send(&room_id("r1"), draft(&"a".repeat(4097)), sender)
            .await;

        // then (期待する結果):
        assert!(exact.is_ok());
        assert_eq!(
            over,
            Err(SendError::PayloadTooLarge {
                size: 4097,
                max: 4096
            })
        );
        assert_eq!(broadcaster.recent(&room_id("r1"), 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_oversized_payload_does_not_consume_token() {
        // テスト項目: サイズ超過で拒否された送信はトークンを消費しない
        // given (前提条件):
        let config = MessageConfig {
            rate_limit_per_minute: 1,
            ..MessageConfig::default()
        };
        let fixture = create_test_broadcaster(config);
        let broadcaster = &fixture.broadcaster;
        let (alice, _rx) = join_as(broadcaster, "r1", "alice").await;
        let sender = alice.user_id().unwrap();

        // when (操作):
        let rejected = broadcaster
            .send(&room_id("r1"), draft(&"a".repeat(5000)), sender)
            .await;
        let accepted = broadcaster.send(&room_id("r1"), draft("ok"), sender).await;
        let limited = broadcaster.send(&room_id("r1"), draft("again"), sender).await;

        // then (期待する結果):
        assert!(matches!(rejected, Err(SendError::PayloadTooLarge { .. })));
        assert!(accepted.is_ok());
        assert_eq!(limited, Err(SendError::RateLimited));
    }

    #[tokio::test]
    async fn test_rate_limit_recovers_after_a_minute() {
        // テスト項目: レート制限された送信者も 1 分後には再び送信できる
        // given (前提条件):
        let config = MessageConfig {
            rate_limit_per_minute: 2,
            ..MessageConfig::default()
        };
        let fixture = create_test_broadcaster(config);
        let broadcaster = &fixture.broadcaster;
        let (alice, _rx) = join_as(broadcaster, "r1", "alice").await;
        let sender = alice.user_id().unwrap();
        for _ in 0..2 {
            broadcaster.send(&room_id("r1"), draft("x"), sender).await.unwrap();
        }
        assert_eq!(
            broadcaster.send(&room_id("r1"), draft("x"), sender).await,
            Err(SendError::RateLimited)
        );

        // when (操作):
        fixture.clock.advance(Duration::from_secs(60));
        let result = broadcaster.send(&room_id("r1"), draft("x"), sender).await;

        // then (期待する結果):
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_send_to_missing_room() {
        // テスト項目: 存在しないルームへの送信は RoomNotFound
        // given (前提条件):
        let fixture = create_test_broadcaster(MessageConfig::default());

        // when (操作):
        let result = fixture
            .broadcaster
            .send(&room_id("gone"), draft("x"), &UserId::generate())
            .await;

        // then (期待する結果):
        assert_eq!(result, Err(SendError::RoomNotFound));
    }

    #[tokio::test]
    async fn test_members_observe_same_order() {
        // テスト項目: 同時に送信しても全メンバーが同じ順序で受け取る
        // given (前提条件):
        let fixture = create_test_broadcaster(MessageConfig::default());
        let broadcaster = fixture.broadcaster.clone();
        let (alice, mut rx_alice) = join_as(&broadcaster, "r1", "alice").await;
        let (bob, mut rx_bob) = join_as(&broadcaster, "r1", "bob").await;
        settle().await;
        drain(&mut rx_alice);
        drain(&mut rx_bob);

        // when (操作):
        let mut handles = Vec::new();
        let senders = [
            (alice.user_id().unwrap().clone(), "a"),
            (bob.user_id().unwrap().clone(), "b"),
        ];
        for (sender, prefix) in senders {
            let broadcaster = broadcaster.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    broadcaster
                        .send(&room_id("r1"), draft(&format!("{}{}", prefix, i)), &sender)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // then (期待する結果):
        let seen_by_alice: Vec<String> =
            drain(&mut rx_alice).into_iter().map(|f| f.encrypted).collect();
        let seen_by_bob: Vec<String> =
            drain(&mut rx_bob).into_iter().map(|f| f.encrypted).collect();
        assert_eq!(seen_by_alice.len(), 20);
        assert_eq!(seen_by_alice, seen_by_bob);
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_the_slow_member() {
        // テスト項目: キューが満杯のメンバーだけが切り離され、他のメンバーには届き続ける
        // given (前提条件):
        let fixture = create_test_broadcaster(MessageConfig::default());
        let broadcaster = &fixture.broadcaster;
        let (alice, mut rx_alice) = join_as(broadcaster, "r1", "alice").await;
        let (mut slow, mut rx_slow) = connect(broadcaster, 1).await;
        broadcaster
            .join(&mut slow, room_id("r1"), UserId::generate(), "slow".to_string())
            .await
            .unwrap();
        settle().await;
        drain(&mut rx_alice);
        let sender = alice.user_id().unwrap();

        // when (操作):
        // slow のキューには roster の 1 件が残っているため、次の送信で溢れる
        broadcaster.send(&room_id("r1"), draft("m1"), sender).await.unwrap();
        broadcaster.send(&room_id("r1"), draft("m2"), sender).await.unwrap();

        // then (期待する結果):
        let to_alice: Vec<String> =
            drain(&mut rx_alice).into_iter().map(|f| f.encrypted).collect();
        assert_eq!(to_alice, vec!["m1", "m2"]);
        assert_eq!(broadcaster.member_count(&room_id("r1")).await, 1);
        assert!(slow.outbound().is_closed());
        let to_slow = drain(&mut rx_slow);
        assert_eq!(to_slow.len(), 1);
        assert_eq!(rx_slow.recv().await, None);
    }
}
