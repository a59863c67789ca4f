//! Connection エンティティとそのライフサイクル
//!
//! ```text
//! Unbound --join--> Joined --leave--> Closed
//!    |                                  ^
//!    +-------------close----------------+
//! ```
//!
//! `Closed` は終端状態。再接続は新しい接続として扱う。

use tokio::sync::mpsc;

use super::{
    message_pusher::OutboundQueue,
    value_object::{ConnectionId, RoomId, UserId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Joined {
        room_id: RoomId,
        user_id: UserId,
        display_name: String,
    },
    Closed,
}

/// 1 本の双方向セッション（トランスポートのタスクが所有する）
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    outbound: OutboundQueue,
}

impl Connection {
    /// 新しい送信キューを持つ Unbound の接続を作成
    pub fn new(queue_capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, rx) = OutboundQueue::bounded(queue_capacity);
        (
            Self {
                id: ConnectionId::generate(),
                state: ConnectionState::Unbound,
                outbound,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// 参加中のルーム ID
    pub fn room_id(&self) -> Option<&RoomId> {
        match &self.state {
            ConnectionState::Joined { room_id, .. } => Some(room_id),
            _ => None,
        }
    }

    /// 参加中のセッションにサーバーが発行したユーザー ID
    pub fn user_id(&self) -> Option<&UserId> {
        match &self.state {
            ConnectionState::Joined { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    /// `Unbound → Joined`。それ以外の遷移は拒否する
    pub fn bind(&mut self, room_id: RoomId, user_id: UserId, display_name: String) -> bool {
        if self.state != ConnectionState::Unbound {
            return false;
        }
        self.state = ConnectionState::Joined {
            room_id,
            user_id,
            display_name,
        };
        true
    }

    /// `Closed` に遷移し、直前の状態を返す
    pub fn close(&mut self) -> ConnectionState {
        std::mem::replace(&mut self.state, ConnectionState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(id: &str) -> RoomId {
        RoomId::new(id.to_string()).unwrap()
    }

    #[test]
    fn test_new_connection_is_unbound() {
        // テスト項目: 新しい接続は Unbound 状態で始まる
        // given (前提条件):
        let (connection, _rx) = Connection::new(8);

        // when (操作):
        let state = connection.state().clone();

        // then (期待する結果):
        assert_eq!(state, ConnectionState::Unbound);
        assert!(connection.room_id().is_none());
    }

    #[test]
    fn test_bind_only_from_unbound() {
        // テスト項目: Joined への遷移は Unbound からのみ許可される
        // given (前提条件):
        let (mut connection, _rx) = Connection::new(8);

        // when (操作):
        let first = connection.bind(room("r1"), UserId::generate(), "alice".to_string());
        let second = connection.bind(room("r2"), UserId::generate(), "alice".to_string());

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert_eq!(connection.room_id(), Some(&room("r1")));
    }

    #[test]
    fn test_closed_is_terminal() {
        // テスト項目: Closed からは再び Joined にならない
        // given (前提条件):
        let (mut connection, _rx) = Connection::new(8);
        connection.bind(room("r1"), UserId::generate(), "alice".to_string());

        // when (操作):
        let previous = connection.close();
        let rebound = connection.bind(room("r1"), UserId::generate(), "alice".to_string());

        // then (期待する結果):
        assert!(matches!(previous, ConnectionState::Joined { .. }));
        assert!(!rebound);
        assert!(connection.is_closed());
        assert_eq!(connection.close(), ConnectionState::Closed);
    }
}
