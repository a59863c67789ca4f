//! InMemory Room Registry 実装
//!
//! ドメイン層が定義する RoomRegistry trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;

use roomcast_shared::time::Clock;

use crate::domain::{Room, RoomId, RoomRegistry, Timestamp};

/// インメモリ Room Registry 実装
///
/// ルームはロックを取ったまま生成されるため、同じ ID への同時 `get_or_create`
/// は必ず同じインスタンスを受け取る。
pub struct InMemoryRoomRegistry {
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
    history_capacity: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryRoomRegistry {
    /// 新しい InMemoryRoomRegistry を作成
    pub fn new(history_capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            history_capacity,
            clock,
        }
    }
}

#[async_trait]
impl RoomRegistry for InMemoryRoomRegistry {
    async fn get_or_create(&self, room_id: &RoomId, default_name: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let room = Arc::new(Room::new(
            room_id.clone(),
            default_name.to_string(),
            Timestamp::new(self.clock.now_millis()),
            self.history_capacity,
        ));
        rooms.insert(room_id.clone(), room.clone());
        tracing::info!("Created room: {} ({})", default_name, room_id);
        room
    }

    async fn get(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    async fn remove(&self, room_id: &RoomId) -> bool {
        let mut rooms = self.rooms.lock().await;
        let Some(room) = rooms.get(room_id).cloned() else {
            return false;
        };

        // 空かどうかはここで再確認する（確認後に誰かが参加している可能性がある）
        let mut state = room.lock().await;
        if !state.is_empty() {
            tracing::debug!("Room {} is not empty anymore; keeping it", room_id);
            return false;
        }
        state.mark_evicted();
        rooms.remove(room_id);
        tracing::info!("Deleted empty room: {}", room_id);
        true
    }

    async fn remove_idle(&self, now: Timestamp, max_age: Duration) -> Vec<RoomId> {
        let mut rooms = self.rooms.lock().await;
        let mut removed = Vec::new();

        for (room_id, room) in rooms.iter() {
            let mut state = room.lock().await;
            let is_old = now.elapsed_since(room.created_at()) > max_age;
            if state.is_empty() && is_old {
                state.mark_evicted();
                removed.push(room_id.clone());
            }
        }
        for room_id in &removed {
            rooms.remove(room_id);
            tracing::info!("Cleaned up old room: {}", room_id);
        }

        removed
    }

    async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }
}
