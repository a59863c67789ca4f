//! 送信者ごとのトークンバケットによるレート制限
//!
//! 補充は判定時に遅延して行う。前回の補充から 1 分経過するごとに 1 トークン増え、
//! 容量（= 1 分あたりの上限）を超えない。バックグラウンドの補充処理はなく、
//! Reaper は長く使われていないバケットを削除するだけ。

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use roomcast_shared::time::Clock;

use super::value_object::{Timestamp, UserId};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// 1 送信者分のバケットの状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBucket {
    tokens: u32,
    capacity: u32,
    last_refill: Timestamp,
    last_seen: Timestamp,
}

impl TokenBucket {
    /// 満タンのバケット
    pub fn new(capacity: u32, now: Timestamp) -> Self {
        Self {
            tokens: capacity,
            capacity,
            last_refill: now,
            last_seen: now,
        }
    }

    pub fn tokens(&self) -> u32 {
        self.tokens
    }

    pub fn last_seen(&self) -> Timestamp {
        self.last_seen
    }

    /// 補充してから、残っていれば 1 トークン消費する
    pub fn try_acquire(&mut self, now: Timestamp) -> bool {
        self.last_seen = now;

        let elapsed_minutes = (now.value() - self.last_refill.value()).max(0) / MILLIS_PER_MINUTE;
        if elapsed_minutes > 0 {
            let added = u32::try_from(elapsed_minutes).unwrap_or(u32::MAX);
            self.tokens = self.tokens.saturating_add(added).min(self.capacity);
            self.last_refill = now;
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }
}

/// 送信者 → バケットのマップ
///
/// マップ全体のロックとバケットごとのロックを持つ。異なる送信者の判定が競合するのは
/// バケットを引く間だけ
pub struct RateLimiter {
    buckets: Mutex<HashMap<UserId, Arc<Mutex<TokenBucket>>>>,
    capacity: u32,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(per_minute: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity: per_minute,
            clock,
        }
    }

    /// `user_id` が今 1 件送信してよいか
    pub async fn allow(&self, user_id: &UserId) -> bool {
        let now = Timestamp::new(self.clock.now_millis());
        let bucket = {
            let mut buckets = self.buckets.lock().await;
            buckets
                .entry(user_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::new(self.capacity, now))))
                .clone()
        };

        let allowed = bucket.lock().await.try_acquire(now);
        if !allowed {
            tracing::debug!("Rate limit hit for '{}'", user_id);
        }
        allowed
    }

    /// `max_idle` の間使われていないバケットを削除し、削除数を返す
    pub async fn sweep_stale(&self, max_idle: Duration) -> usize {
        let now = Timestamp::new(self.clock.now_millis());
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();

        let mut stale = Vec::new();
        for (user_id, bucket) in buckets.iter() {
            if now.elapsed_since(bucket.lock().await.last_seen()) > max_idle {
                stale.push(user_id.clone());
            }
        }
        for user_id in &stale {
            buckets.remove(user_id);
        }

        before - buckets.len()
    }

    /// 追跡中の送信者数
    pub async fn tracked_users(&self) -> usize {
        self.buckets.lock().await.len()
    }
}
