//! UseCase: ルームからの退出（切断処理）
//!
//! 何度呼ばれても安全（冪等）。送信キューを閉じるのは最初の 1 回だけ。

use crate::domain::{ChatMessage, Connection, ConnectionState, MessageKind};

use super::broadcaster::{Broadcaster, encode};

impl Broadcaster {
    /// 接続をルームから外し、送信キューを閉じる
    ///
    /// 参加中だった場合は残りのメンバーに `user_left` を通知し、ルームが空に
    /// なれば削除する。
    pub async fn leave(&self, connection: &mut Connection) {
        let connection_id = connection.id();

        if let ConnectionState::Joined {
            room_id,
            display_name,
            ..
        } = connection.close()
        {
            if let Some(room) = self.registry.get(&room_id).await {
                let mut state = room.lock().await;
                if state.remove_member(&connection_id).is_some() {
                    let left = ChatMessage::control(
                        MessageKind::UserLeft,
                        room_id.clone(),
                        display_name.clone(),
                        self.now(),
                    );
                    if let Some(frame) = encode(&left) {
                        let remaining = state.member_ids();
                        self.fan_out(&room_id, &mut state, &remaining, &frame).await;
                    }
                    tracing::info!(
                        "'{}' ({}) left room {} ({} members)",
                        display_name,
                        connection_id,
                        room_id,
                        state.member_count()
                    );
                }
                let empty = state.is_empty();
                drop(state);

                if empty {
                    self.evict_if_empty(&room_id).await;
                }
            }
        }

        if self.pusher.unregister_client(&connection_id).await {
            tracing::debug!("Connection {} detached", connection_id);
        }
    }
}
