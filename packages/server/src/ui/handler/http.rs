//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{infrastructure::dto::http::HealthDto, ui::state::AppState};

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        rooms: state.broadcaster.room_count().await,
        connections: state.broadcaster.connection_count().await,
    })
}
