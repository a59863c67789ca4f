//! Ephemeral room broadcast server.
//!
//! Clients join a room over WebSocket and every message is fanned out to all
//! members of that room.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin roomcast-server
//! cargo run --bin roomcast-server -- --host 0.0.0.0 --port 3000 --redis-url redis://127.0.0.1/
//! ```

use std::{sync::Arc, time::Duration};

use clap::Parser;

use roomcast_server::{
    config::{ConnectionConfig, MessageConfig, ReaperConfig},
    domain::{DurableStore, RateLimiter},
    infrastructure::{
        durable::RedisDurableStore, message_pusher::ChannelMessagePusher,
        repository::InMemoryRoomRegistry,
    },
    ui::Server,
    usecase::{Broadcaster, HistoryStore, Reaper},
};
use roomcast_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};

#[derive(Parser, Debug)]
#[command(name = "roomcast-server")]
#[command(about = "Ephemeral room broadcast server for encrypted chat", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Redis URL for durable history; memory-only when absent or unreachable
    #[arg(long)]
    redis_url: Option<String>,

    /// Maximum payload size in bytes
    #[arg(long, default_value_t = MessageConfig::default().max_message_size)]
    max_message_size: usize,

    /// Message lifetime in seconds
    #[arg(long, default_value_t = MessageConfig::default().message_ttl.as_secs())]
    message_ttl_secs: u64,

    /// Messages per minute per sender
    #[arg(long, default_value_t = MessageConfig::default().rate_limit_per_minute)]
    rate_limit: u32,

    /// Messages kept per room in Redis
    #[arg(long, default_value_t = MessageConfig::default().max_room_messages)]
    max_room_messages: usize,
}

impl Args {
    fn message_config(&self) -> MessageConfig {
        MessageConfig {
            max_message_size: self.max_message_size,
            message_ttl: Duration::from_secs(self.message_ttl_secs),
            rate_limit_per_minute: self.rate_limit,
            max_room_messages: self.max_room_messages,
            ..MessageConfig::default()
        }
    }
}

/// Connect to Redis if configured; any failure degrades to memory-only.
async fn connect_durable(redis_url: Option<&str>) -> Option<Arc<dyn DurableStore>> {
    let url = redis_url?;
    match RedisDurableStore::connect(url).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(
                "Redis connection failed: {}. Falling back to in-memory storage.",
                e
            );
            None
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    let message_config = args.message_config();

    // Initialize dependencies in order:
    // 1. Clock, registry, pusher, durable tier
    // 2. HistoryStore, RateLimiter
    // 3. Broadcaster
    // 4. Reaper
    // 5. Server

    // 1.
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(InMemoryRoomRegistry::new(
        message_config.memory_history_capacity,
        clock.clone(),
    ));
    let pusher = Arc::new(ChannelMessagePusher::new());
    let durable = connect_durable(args.redis_url.as_deref()).await;

    // 2.
    let history = Arc::new(HistoryStore::new(durable, clock.clone(), &message_config));
    if !history.is_durable() {
        tracing::info!("Running with in-memory history only");
    }
    let rate_limiter = Arc::new(RateLimiter::new(
        message_config.rate_limit_per_minute,
        clock.clone(),
    ));

    // 3.
    let broadcaster = Arc::new(Broadcaster::new(
        registry,
        pusher,
        history,
        rate_limiter,
        clock,
        message_config,
    ));

    // 4.
    let reaper = Reaper::new(broadcaster.clone(), ReaperConfig::default()).start();

    // 5.
    let server = Server::new(broadcaster, ConnectionConfig::default());
    let result = server.run(args.host, args.port).await;

    reaper.shutdown().await;

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
