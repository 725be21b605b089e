//! Error taxonomy and wire-format error codes.

use serde::{Deserialize, Serialize};

use crate::ids::{GameId, PlayerId};

// ── Error code constants ────────────────────────────────────────────

/// Malformed or unrecognized inbound message.
pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
/// Game id not present in the arena.
pub const GAME_NOT_FOUND: &str = "GAME_NOT_FOUND";
/// Message received for a game that already ended.
pub const GAME_CLOSED: &str = "GAME_CLOSED";
/// Could not deliver a broadcast to a participant.
pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
/// Payload content rejected (out-of-range position, unknown player).
pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";

/// Errors produced by the session engine.
///
/// Transport- and protocol-level failures are handled at the connection
/// handler (logged, message or participant dropped) and never unwind past
/// it; only [`GameError::NotFound`] is surfaced to the original requester.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Inbound frame could not be decoded into a known message.
    #[error("malformed message: {message}")]
    Protocol {
        /// What the decoder rejected.
        message: String,
    },

    /// No live game under this id.
    #[error("game not found: {game_id}")]
    NotFound {
        /// The id that missed.
        game_id: GameId,
    },

    /// The game already reached its terminal state.
    #[error("game {game_id} has ended")]
    Closed {
        /// The finished game.
        game_id: GameId,
    },

    /// A broadcast frame could not be delivered to one participant.
    #[error("could not deliver to player {player_id}")]
    Connection {
        /// The unreachable participant.
        player_id: PlayerId,
    },

    /// Payload was well-formed but its content violates a game invariant.
    #[error("{message}")]
    Validation {
        /// Which invariant was violated.
        message: String,
    },
}

impl GameError {
    /// Machine-readable code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Protocol { .. } => PROTOCOL_ERROR,
            Self::NotFound { .. } => GAME_NOT_FOUND,
            Self::Closed { .. } => GAME_CLOSED,
            Self::Connection { .. } => CONNECTION_ERROR,
            Self::Validation { .. } => VALIDATION_ERROR,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_owned(),
                message: self.to_string(),
            },
        }
    }
}

/// Error response body sent on the HTTP surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Detail inside an [`ErrorBody`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}
