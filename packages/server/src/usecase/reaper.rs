//! バックグラウンドでの後片付け
//!
//! アイドルなルーム・永続層の期限切れ履歴・古いレート制限バケットの 3 つを
//! それぞれ定期的に掃除する。[`Reaper::start`] までは何も起動せず、
//! 返された [`ReaperHandle`] で全タスクを停止して待つ。

use std::sync::Arc;

use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{config::ReaperConfig, domain::RoomId};

use super::broadcaster::Broadcaster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sweep {
    IdleRooms,
    ExpiredHistory,
    StaleLimiters,
}

pub struct Reaper {
    broadcaster: Arc<Broadcaster>,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(broadcaster: Arc<Broadcaster>, config: ReaperConfig) -> Self {
        Self {
            broadcaster,
            config,
        }
    }

    /// 掃除タスクを起動する。最初の掃除は開始から 1 間隔後
    pub fn start(self) -> ReaperHandle {
        let (shutdown_tx, _) = broadcast::channel(1);
        let reaper = Arc::new(self);

        let tasks: Vec<JoinHandle<()>> = [
            (Sweep::IdleRooms, reaper.config.idle_room_interval),
            (Sweep::ExpiredHistory, reaper.config.history_interval),
            (Sweep::StaleLimiters, reaper.config.limiter_interval),
        ]
        .into_iter()
        .map(|(sweep, period)| {
            let reaper = reaper.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => reaper.run(sweep).await,
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("{:?} sweep stopped", sweep);
                            break;
                        }
                    }
                }
            })
        })
        .collect();

        tracing::info!("Reaper started");
        ReaperHandle { shutdown_tx, tasks }
    }

    async fn run(&self, sweep: Sweep) {
        match sweep {
            Sweep::IdleRooms => {
                self.sweep_idle_rooms().await;
            }
            Sweep::ExpiredHistory => {
                self.sweep_expired_history().await;
            }
            Sweep::StaleLimiters => {
                self.sweep_stale_limiters().await;
            }
        }
    }

    /// 設定より古い空のルームを削除
    pub async fn sweep_idle_rooms(&self) -> Vec<RoomId> {
        let removed = self
            .broadcaster
            .registry
            .remove_idle(self.broadcaster.now(), self.config.idle_room_max_age)
            .await;
        tracing::info!("Idle room sweep removed {} rooms", removed.len());
        removed
    }

    /// メッセージが失効した永続層のインデックスを掃除
    pub async fn sweep_expired_history(&self) -> usize {
        match self.broadcaster.history.prune_expired().await {
            Ok(removed) => {
                tracing::info!("History sweep removed {} expired entries", removed);
                removed
            }
            Err(e) => {
                tracing::warn!("History sweep failed: {}", e);
                0
            }
        }
    }

    /// 設定期間使われていないレート制限バケットを破棄
    pub async fn sweep_stale_limiters(&self) -> usize {
        let removed = self
            .broadcaster
            .rate_limiter
            .sweep_stale(self.config.limiter_max_idle)
            .await;
        tracing::info!("Rate limiter sweep removed {} buckets", removed);
        removed
    }
}

/// [`Reaper::start`] で起動した掃除を止めるハンドル
pub struct ReaperHandle {
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl ReaperHandle {
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// 全ての掃除タスクに停止を通知し、終了を待つ
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Reaper task failed: {}", e);
            }
        }
        tracing::info!("Reaper stopped");
    }
}
