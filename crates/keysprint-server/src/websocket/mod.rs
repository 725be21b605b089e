//! WebSocket attach, per-connection receive loop, and outbound forwarding.

pub mod session;

pub use session::run_player_session;
