//! # keysprint-server
//!
//! Axum HTTP + `WebSocket` server for keysprint typing races.
//!
//! - HTTP endpoints: game creation/lookup, health check, Prometheus metrics
//! - `WebSocket` gateway at `/ws/{game_id}`: one tokio task per participant,
//!   bounded outbound queue, periodic Ping frames
//! - Abandoned-game sweeper on a config-driven interval
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::KeysprintServer;
