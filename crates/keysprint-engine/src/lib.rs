//! # keysprint-engine
//!
//! The typing-race session engine:
//!
//! - [`Game`] — one race's authoritative state machine (roster, target text,
//!   status, progress, winner) with serialized transitions and non-blocking
//!   broadcast fan-out
//! - [`Outbox`] — the opaque per-participant delivery handle
//! - [`Arena`] — the concurrency-safe registry of live games
//!
//! The engine is transport-agnostic: it consumes already-decoded
//! [`keysprint_core::protocol::ClientMessage`]s and pushes serialized frames
//! into outboxes. The server crate owns the sockets.

#![deny(unsafe_code)]

pub mod arena;
pub mod game;
pub mod outbox;

pub use arena::Arena;
pub use game::{Game, Transition};
pub use outbox::Outbox;
