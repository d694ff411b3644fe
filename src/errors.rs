use thiserror::Error;

use crate::enums::Color;
use crate::geometry::Cell;
use crate::pieces::PieceId;

pub type MatchId = String;
pub type ConnectionId = String;

/// Top-level error type for the whole arena
#[derive(Error, Debug, Clone)]
pub enum ArenaError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Infrastructure error: {0}")]
    Infrastructure(#[from] InfrastructureError),
}

/// Rejections raised by a game session. None of them mutate state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Not your turn: current={expected}, attempted={attempted}")]
    TurnViolation { expected: Color, attempted: Color },

    #[error("Invalid move: {piece_id} cannot reach {target}")]
    IllegalMove { piece_id: PieceId, target: Cell },

    #[error("Piece not found: {piece_id}")]
    UnknownPiece { piece_id: PieceId },

    #[error("Not your piece: {piece_id}")]
    NotYourPiece { piece_id: PieceId },

    #[error("Game is over")]
    GameOver,

    #[error("Spectators cannot change the game")]
    SpectatorInput,
}

/// Network/WebSocket errors
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection lost: {connection_id} ({details})")]
    ConnectionLost {
        connection_id: ConnectionId,
        details: String,
    },

    #[error("Message serialization failed: {details}")]
    SerializationFailed { details: String },

    #[error("Invalid message format: {details}")]
    DeserializationFailed { details: String },

    #[error("Not in a game: {connection_id}")]
    NotInSession { connection_id: ConnectionId },

    #[error("Session closed: {match_id}")]
    SessionClosed { match_id: MatchId },
}

/// Failure reported by an event feed subscriber. Logged by the feed, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriberError {
    #[error("Subscriber {subscriber} failed: {details}")]
    Failed { subscriber: String, details: String },
}

#[derive(Error, Debug, Clone)]
pub enum InfrastructureError {
    #[error("Configuration error: {details}")]
    Configuration { details: String },
}

/// Result type aliases for convenience
pub type ArenaResult<T> = Result<T, ArenaError>;
pub type SessionResult<T> = Result<T, SessionError>;
pub type NetworkResult<T> = Result<T, NetworkError>;

impl SessionError {
    pub fn turn_violation(expected: Color, attempted: Color) -> Self {
        Self::TurnViolation {
            expected,
            attempted,
        }
    }

    pub fn illegal_move(piece_id: impl Into<PieceId>, target: Cell) -> Self {
        Self::IllegalMove {
            piece_id: piece_id.into(),
            target,
        }
    }

    pub fn unknown_piece(piece_id: impl Into<PieceId>) -> Self {
        Self::UnknownPiece {
            piece_id: piece_id.into(),
        }
    }
}

impl NetworkError {
    pub fn connection_lost(connection_id: impl Into<ConnectionId>, details: impl Into<String>) -> Self {
        Self::ConnectionLost {
            connection_id: connection_id.into(),
            details: details.into(),
        }
    }

    pub fn deserialization_failed(details: impl Into<String>) -> Self {
        Self::DeserializationFailed {
            details: details.into(),
        }
    }

    pub fn serialization_failed(details: impl Into<String>) -> Self {
        Self::SerializationFailed {
            details: details.into(),
        }
    }

    pub fn not_in_session(connection_id: impl Into<ConnectionId>) -> Self {
        Self::NotInSession {
            connection_id: connection_id.into(),
        }
    }
}

impl SubscriberError {
    pub fn failed(subscriber: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Failed {
            subscriber: subscriber.into(),
            details: details.into(),
        }
    }
}

impl InfrastructureError {
    pub fn configuration(details: impl Into<String>) -> Self {
        Self::Configuration {
            details: details.into(),
        }
    }
}
