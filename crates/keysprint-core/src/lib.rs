//! # keysprint-core
//!
//! Shared types for the keysprint typing-race server:
//!
//! - Branded ID newtypes ([`GameId`], [`PlayerId`])
//! - The WebSocket wire protocol ([`protocol::ClientMessage`],
//!   [`protocol::ServerMessage`]) and the game snapshot types
//! - The error taxonomy ([`errors::GameError`]) with machine-readable codes

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod protocol;

pub use errors::GameError;
pub use ids::{GameId, PlayerId};
