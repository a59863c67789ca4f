//! Server state shared by every handler.

use std::sync::Arc;

use crate::{config::ConnectionConfig, usecase::Broadcaster};

/// Shared application state
pub struct AppState {
    /// Broadcaster（ルーム・送信・履歴の全ての操作の入口）
    pub broadcaster: Arc<Broadcaster>,
    /// 接続ごとの送信キュー・keepalive の設定
    pub connection_config: ConnectionConfig,
}
