//! Server execution logic.

use std::{future::Future, sync::Arc};

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::{config::ConnectionConfig, usecase::Broadcaster};

use super::{
    handler::{health_check, websocket_handler},
    signal::shutdown_signal,
    state::AppState,
};

/// WebSocket broadcast server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(broadcaster, ConnectionConfig::default());
/// server.run("127.0.0.1".to_string(), 8080).await?;
/// ```
pub struct Server {
    /// Broadcaster（全ての接続で共有されるコンテキスト）
    broadcaster: Arc<Broadcaster>,
    connection_config: ConnectionConfig,
}

impl Server {
    pub fn new(broadcaster: Arc<Broadcaster>, connection_config: ConnectionConfig) -> Self {
        Self {
            broadcaster,
            connection_config,
        }
    }

    /// Build the router with every endpoint
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            broadcaster: self.broadcaster.clone(),
            connection_config: self.connection_config.clone(),
        });

        Router::new()
            // WebSocket エンドポイント
            .route("/ws/chat", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(app_state)
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
    }

    /// Run the server until Ctrl+C or SIGTERM
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Broadcast server listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws/chat", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        self.serve(listener, shutdown_signal()).await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}
