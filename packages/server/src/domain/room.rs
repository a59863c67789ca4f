//! Room エンティティ
//!
//! ルームは接続の集合と、直近のメッセージの上限付きキャッシュを持つ。
//! ID と作成時刻は不変。メンバーと履歴はルームごとに 1 つのロックの内側にあり、
//! このロックがファンアウトも直列化するので、全メンバーが受理されたメッセージを
//! 同じ順序で受け取る。

use std::collections::{HashMap, VecDeque};

use tokio::sync::{Mutex, MutexGuard};

use super::{
    entity::{ChatMessage, Member},
    value_object::{ConnectionId, RoomId, Timestamp},
};

/// ルームごとのメモリ履歴のデフォルト件数
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    name: String,
    created_at: Timestamp,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(id: RoomId, name: String, created_at: Timestamp, history_capacity: usize) -> Self {
        Self {
            id,
            name,
            created_at,
            state: Mutex::new(RoomState::new(history_capacity)),
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// ルームのロックを取得
    pub async fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().await
    }

    pub async fn member_count(&self) -> usize {
        self.state.lock().await.member_count()
    }

    pub async fn recent_history(&self, limit: usize, now: Timestamp) -> Vec<ChatMessage> {
        self.state.lock().await.recent_history(limit, now)
    }
}

/// ルームの可変部分（[`Room::lock`] 経由でのみ触れる）
#[derive(Debug)]
pub struct RoomState {
    members: HashMap<ConnectionId, Member>,
    history: VecDeque<ChatMessage>,
    history_capacity: usize,
    evicted: bool,
}

impl RoomState {
    fn new(history_capacity: usize) -> Self {
        Self {
            members: HashMap::new(),
            history: VecDeque::with_capacity(history_capacity),
            history_capacity,
            evicted: false,
        }
    }

    /// メンバーを追加
    ///
    /// ルームが既にレジストリから削除されていれば `false` を返す。
    /// 呼び出し側はルームを取得し直す必要がある
    pub fn add_member(&mut self, connection_id: ConnectionId, member: Member) -> bool {
        if self.evicted {
            return false;
        }
        self.members.insert(connection_id, member);
        true
    }

    /// メンバーを削除（未知の接続なら何もしない）
    pub fn remove_member(&mut self, connection_id: &ConnectionId) -> Option<Member> {
        self.members.remove(connection_id)
    }

    pub fn member_ids(&self) -> Vec<ConnectionId> {
        self.members.keys().copied().collect()
    }

    /// `exclude` 以外のメンバー
    pub fn other_members(&self, exclude: &ConnectionId) -> Vec<(ConnectionId, Member)> {
        self.members
            .iter()
            .filter(|(id, _)| *id != exclude)
            .map(|(id, member)| (*id, member.clone()))
            .collect()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 履歴に追加し、上限を超えた古いものから捨てる
    pub fn append_history(&mut self, message: ChatMessage) {
        self.history.push_back(message);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// 期限切れでない最新 `limit` 件を古い順で返す
    pub fn recent_history(&self, limit: usize, now: Timestamp) -> Vec<ChatMessage> {
        let skip = self.history.len().saturating_sub(limit);
        self.history
            .iter()
            .skip(skip)
            .filter(|message| !message.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// レジストリから削除済みとして印を付ける
    pub fn mark_evicted(&mut self) {
        self.evicted = true;
    }

    pub fn is_evicted(&self) -> bool {
        self.evicted
    }
}
