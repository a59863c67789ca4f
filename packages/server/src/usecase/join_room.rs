//! UseCase: ルームへの参加
//!
//! 1. ルームを取得または作成（削除と競合した場合は取り直す）
//! 2. 参加者として追加
//! 3. 参加者本人に既存メンバーの一覧（`user_joined`）を送信
//! 4. 他のメンバーに `user_joined` をブロードキャスト
//! 5. 接続を Joined に遷移
//! 6. 直近の履歴を本人にだけ非同期で配信

use crate::domain::{
    ChatMessage, Connection, ConnectionState, Member, MessageKind, RoomId, UserId,
};

use super::{
    broadcaster::{Broadcaster, encode},
    error::JoinError,
};

impl Broadcaster {
    /// 接続をルームに参加させる
    ///
    /// 遅いメンバーを待つことはない。参加者本人への履歴配信はバックグラウンドで
    /// 行われ、失敗しても参加自体には影響しない。
    pub async fn join(
        &self,
        connection: &mut Connection,
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
    ) -> Result<(), JoinError> {
        match connection.state() {
            ConnectionState::Unbound => {}
            ConnectionState::Joined { .. } => return Err(JoinError::AlreadyJoined),
            ConnectionState::Closed => return Err(JoinError::Closed),
        }

        let connection_id = connection.id();
        let now = self.now();
        let member = Member::new(user_id.clone(), display_name.clone(), now);

        let room = loop {
            let room = self
                .registry
                .get_or_create(&room_id, &self.config.default_room_name)
                .await;
            let mut state = room.lock().await;
            if !state.add_member(connection_id, member.clone()) {
                tracing::debug!("Room {} was evicted while joining; retrying", room_id);
                continue;
            }

            let others = state.other_members(&connection_id);
            for (_, other) in &others {
                let roster = ChatMessage::control(
                    MessageKind::UserJoined,
                    room_id.clone(),
                    other.display_name.clone(),
                    other.joined_at,
                );
                if let Some(frame) = encode(&roster) {
                    if let Err(e) = self.pusher.push_to(&connection_id, &frame).await {
                        tracing::warn!("Failed to send roster to {}: {}", connection_id, e);
                        break;
                    }
                }
            }

            let joined = ChatMessage::control(
                MessageKind::UserJoined,
                room_id.clone(),
                display_name.clone(),
                now,
            );
            if let Some(frame) = encode(&joined) {
                let targets: Vec<_> = others.iter().map(|(id, _)| *id).collect();
                self.fan_out(&room_id, &mut state, &targets, &frame).await;
            }

            tracing::info!(
                "'{}' ({}) joined room {} ({} members)",
                display_name,
                connection_id,
                room_id,
                state.member_count()
            );
            drop(state);
            break room;
        };

        connection.bind(room_id.clone(), user_id, display_name);

        let history = self.history.clone();
        let pusher = self.pusher.clone();
        let limit = self.config.join_history_limit;
        tokio::spawn(async move {
            let messages = history.recent(&room_id, Some(room.as_ref()), limit).await;
            let count = messages.len();
            for message in &messages {
                let Some(frame) = encode(message) else {
                    continue;
                };
                if let Err(e) = pusher.push_to(&connection_id, &frame).await {
                    tracing::debug!("Stopped history delivery to {}: {}", connection_id, e);
                    return;
                }
            }
            if count > 0 {
                tracing::debug!("Delivered {} history messages to {}", count, connection_id);
            }
        });

        Ok(())
    }
}
