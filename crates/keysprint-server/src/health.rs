//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Currently attached WebSocket connections.
    pub connections: usize,
    /// Live games in the arena.
    pub active_games: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, active_games: usize) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        active_games,
    }
}
