//! The WebSocket wire protocol.
//!
//! Every frame is an envelope `{"type": <kind>, "payload": <kind-specific>}`.
//! Inbound and outbound kinds form two closed sums: [`ClientMessage`] is what
//! a participant may send, [`ServerMessage`] is what the engine broadcasts.
//! Payload shapes are validated per variant at decode time; an unknown kind
//! or a mismatched payload is a [`GameError::Protocol`] and never reaches
//! the game.

use serde::{Deserialize, Serialize};

use crate::errors::GameError;
use crate::ids::{GameId, PlayerId};

/// Lifecycle of one game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Open for joining, race not yet started.
    Created,
    /// Race in progress.
    Active,
    /// Terminal; a winner has been recorded.
    Ended,
}

/// A participant's public fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// The participant's id.
    pub player_id: PlayerId,
    /// Count of correctly typed characters.
    pub position: usize,
}

/// Point-in-time view of a game; also the HTTP create/lookup response body.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// The game's id.
    pub game_id: GameId,
    /// Current lifecycle state.
    pub status: GameStatus,
    /// The text participants race to type.
    pub text: String,
    /// Roster in join order.
    pub players: Vec<PlayerSnapshot>,
    /// The winner, present only once the game has ended.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winner_id: Option<PlayerId>,
}

/// Payload of a `status_update` broadcast: the refreshed game on start, the
/// winner on end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    /// The status just transitioned to.
    pub status: GameStatus,
    /// Full snapshot, sent on `Created → Active`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub game: Option<GameSnapshot>,
    /// Winning player, sent on `Active → Ended`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub winner_id: Option<PlayerId>,
}

/// Messages a participant's connection may send to the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the `Created → Active` transition.
    StartGame,
    /// Report the named player's current typed-character count.
    ///
    /// `position` is decoded as `i64` so a negative report survives to
    /// validation instead of failing as a decode error.
    PositionUpdate {
        /// Player whose progress is being reported.
        player_id: PlayerId,
        /// Reported typed-character count.
        position: i64,
    },
}

impl ClientMessage {
    /// Decode one inbound text frame.
    pub fn decode(frame: &str) -> Result<Self, GameError> {
        serde_json::from_str(frame).map_err(|e| GameError::Protocol {
            message: e.to_string(),
        })
    }
}

/// Messages the engine broadcasts to every participant of a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A new participant joined.
    JoinNotify(PlayerSnapshot),
    /// Echo of a progress tick, delivered to all participants including
    /// the sender.
    PositionUpdate {
        /// Player whose progress changed.
        player_id: PlayerId,
        /// Validated typed-character count.
        position: usize,
    },
    /// A status transition happened.
    StatusUpdate(StatusPayload),
}

impl ServerMessage {
    /// Serialize for the wire. Outbound messages are well-formed by
    /// construction; a failure here is a bug worth surfacing to the caller.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
