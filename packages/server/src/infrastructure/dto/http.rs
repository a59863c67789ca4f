//! HTTP API response DTOs.

use serde::{Deserialize, Serialize};

/// `GET /api/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub rooms: usize,
    pub connections: usize,
}
