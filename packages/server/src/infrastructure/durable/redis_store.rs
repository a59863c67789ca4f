//! Redis Durable Store 実装
//!
//! ドメイン層が定義する DurableStore trait を Redis で実装します。
//! 書き込みは 1 回のパイプラインで行い、接続は `ConnectionManager` が自動で
//! 再接続します。

use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, RedisError, aio::ConnectionManager};

use crate::domain::{ChatMessage, DurableStore, RoomId, StorageError};
use crate::infrastructure::dto::conversion::{decode_message, encode_message};

use super::{INDEX_KEY_PATTERN, index_key, message_key, room_of_index_key};

const SCAN_BATCH: usize = 100;

/// Redis を使った永続層
#[derive(Clone)]
pub struct RedisDurableStore {
    connection: ConnectionManager,
}

impl RedisDurableStore {
    /// 接続し、`PING` に応答することを確認する
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let client = Client::open(url).map_err(storage_error)?;
        let mut connection = client
            .get_connection_manager()
            .await
            .map_err(storage_error)?;
        let pong: String = redis::cmd("PING")
            .query_async(&mut connection)
            .await
            .map_err(storage_error)?;
        tracing::info!("Connected to Redis: {}", pong);
        Ok(Self { connection })
    }
}

fn storage_error(e: RedisError) -> StorageError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        StorageError::Unavailable(e.to_string())
    } else {
        StorageError::Backend(e.to_string())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl DurableStore for RedisDurableStore {
    async fn store(
        &self,
        message: &ChatMessage,
        ttl: Duration,
        max_room_messages: usize,
    ) -> Result<(), StorageError> {
        let Some(message_id) = message.message_id.as_ref() else {
            return Ok(());
        };
        let blob = encode_message(message).map_err(|e| StorageError::Backend(e.to_string()))?;
        let key = message_key(&message.room_id, message_id.as_str());
        let index = index_key(&message.room_id);
        let ttl_millis = millis(ttl);
        let keep = i64::try_from(max_room_messages).unwrap_or(i64::MAX);

        let mut connection = self.connection.clone();
        redis::pipe()
            .cmd("SET")
            .arg(&key)
            .arg(blob)
            .arg("PX")
            .arg(ttl_millis)
            .ignore()
            .cmd("ZADD")
            .arg(&index)
            .arg(message.timestamp.value())
            .arg(message_id.as_str())
            .ignore()
            .cmd("PEXPIRE")
            .arg(&index)
            .arg(ttl_millis)
            .ignore()
            .cmd("ZREMRANGEBYRANK")
            .arg(&index)
            .arg(0)
            .arg(-(keep.saturating_add(1)))
            .ignore()
            .query_async::<()>(&mut connection)
            .await
            .map_err(storage_error)?;

        tracing::debug!("Stored {} (ttl {:?})", key, ttl);
        Ok(())
    }

    async fn recent(&self, room_id: &RoomId, limit: usize) -> Result<Vec<ChatMessage>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut connection = self.connection.clone();
        let stop = i64::try_from(limit).unwrap_or(i64::MAX) - 1;

        let ids: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(index_key(room_id))
            .arg(0)
            .arg(stop)
            .query_async(&mut connection)
            .await
            .map_err(storage_error)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| message_key(room_id, id)).collect();
        let blobs: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut connection)
            .await
            .map_err(storage_error)?;

        let mut messages: Vec<ChatMessage> = keys
            .iter()
            .zip(blobs)
            .filter_map(|(key, blob)| {
                let blob = blob?;
                match decode_message(&blob) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::warn!("Skipping corrupt record {}: {}", key, e);
                        None
                    }
                }
            })
            .collect();
        messages.reverse();
        Ok(messages)
    }

    async fn prune_dangling(&self) -> Result<usize, StorageError> {
        let mut connection = self.connection.clone();
        let mut cursor: u64 = 0;
        let mut removed = 0;

        loop {
            let (next, index_keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(INDEX_KEY_PATTERN)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut connection)
                .await
                .map_err(storage_error)?;

            for index in &index_keys {
                let Some(room) = room_of_index_key(index) else {
                    continue;
                };
                let Ok(room_id) = RoomId::new(room.to_string()) else {
                    continue;
                };
                let ids: Vec<String> = redis::cmd("ZRANGE")
                    .arg(index)
                    .arg(0)
                    .arg(-1)
                    .query_async(&mut connection)
                    .await
                    .map_err(storage_error)?;
                if ids.is_empty() {
                    continue;
                }

                let mut exists = redis::pipe();
                for id in &ids {
                    exists.cmd("EXISTS").arg(message_key(&room_id, id));
                }
                let present: Vec<i64> = exists
                    .query_async(&mut connection)
                    .await
                    .map_err(storage_error)?;

                let dangling: Vec<&String> = ids
                    .iter()
                    .zip(present)
                    .filter(|(_, present)| *present == 0)
                    .map(|(id, _)| id)
                    .collect();
                if dangling.is_empty() {
                    continue;
                }
                let count: usize = redis::cmd("ZREM")
                    .arg(index)
                    .arg(&dangling)
                    .query_async(&mut connection)
                    .await
                    .map_err(storage_error)?;
                removed += count;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(removed)
    }
}
