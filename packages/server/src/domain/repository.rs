//! Repository trait 定義
//!
//! ドメイン層が必要とするデータアクセスのインターフェースを定義します。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::{
    entity::ChatMessage,
    error::StorageError,
    room::Room,
    value_object::{RoomId, Timestamp},
};

/// Room Registry trait
///
/// room id → Room の権威あるマップ。UseCase 層はこの trait に依存する。
///
/// ## ロック順序
///
/// 実装はレジストリのロックを取ってからルームのロックを取る。逆順は禁止。
#[async_trait]
pub trait RoomRegistry: Send + Sync {
    /// ルームを取得し、存在しなければ作成する
    ///
    /// 同じ ID で同時に呼ばれても、全員が同じインスタンスを受け取る
    async fn get_or_create(&self, room_id: &RoomId, default_name: &str) -> Arc<Room>;

    /// ルームを取得
    async fn get(&self, room_id: &RoomId) -> Option<Arc<Room>>;

    /// 空のルームを削除
    ///
    /// 存在しない、または参加者がいる場合は何もせず `false` を返す。
    /// 空かどうかはレジストリのロック下で再確認する。
    async fn remove(&self, room_id: &RoomId) -> bool;

    /// 参加者がおらず、作成から `max_age` 以上経過したルームを削除
    async fn remove_idle(&self, now: Timestamp, max_age: Duration) -> Vec<RoomId>;

    /// 登録中のルーム数
    async fn room_count(&self) -> usize;
}

/// Durable Store trait
///
/// キーごとに有効期限を持つデータ領域と、ルームごとの到着順インデックス。
/// 実行時には任意で、失敗してもメモリ層で続行できる。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// 採番済みメッセージを保存し、ルームのインデックスを `max_room_messages` 件に切り詰める
    async fn store(
        &self,
        message: &ChatMessage,
        ttl: Duration,
        max_room_messages: usize,
    ) -> Result<(), StorageError>;

    /// ルームの最新 `limit` 件を古い順で返す
    ///
    /// 本体が消えたエントリは飛ばす
    async fn recent(&self, room_id: &RoomId, limit: usize)
    -> Result<Vec<ChatMessage>, StorageError>;

    /// 本体が存在しないインデックスのエントリを削除し、削除数を返す
    async fn prune_dangling(&self) -> Result<usize, StorageError>;
}
