use serde::{Deserialize, Serialize};

use crate::enums::{Color, PieceKind, Role};
use crate::errors::{ConnectionId, MatchId, NetworkError, NetworkResult};
use crate::geometry::{BoardGeometry, Cell, PixelPoint};
use crate::pieces::PieceId;
use crate::session::{GameSession, PerColor};

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "move")]
    Move { piece_id: PieceId, target: Cell },

    #[serde(rename = "select_piece")]
    SelectPiece { position: Cell },

    #[serde(rename = "move_cursor")]
    MoveCursor { dx: i8, dy: i8 },

    #[serde(rename = "get_moves")]
    GetMoves { piece_id: PieceId },

    #[serde(rename = "get_game_state")]
    GetGameState,

    #[serde(rename = "ping")]
    Ping,
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "game_started")]
    GameStarted {
        game_id: MatchId,
        player_color: Role,
        opponent: Option<ConnectionId>,
    },

    /// Pushed to every member after state changes.
    #[serde(rename = "board_state")]
    BoardState(StateSnapshot),

    /// Reply to `get_game_state`.
    #[serde(rename = "game_state")]
    GameState(StateSnapshot),

    #[serde(rename = "selection_update")]
    SelectionUpdate {
        selected_white: Option<PieceId>,
        selected_black: Option<PieceId>,
    },

    #[serde(rename = "available_moves")]
    AvailableMoves { piece_id: PieceId, targets: Vec<Cell> },

    #[serde(rename = "game_over")]
    GameOver { winner: Color },

    #[serde(rename = "error")]
    Error { message: String },

    #[serde(rename = "player_disconnected")]
    PlayerDisconnected { message: String },

    #[serde(rename = "pong")]
    Pong,
}

/// One piece on the wire. `type` is the lowercase kind name and the color
/// travels in its own field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieceView {
    pub id: PieceId,
    pub position: Cell,
    #[serde(rename = "type")]
    pub kind: PieceKind,
    pub color: Color,
    pub pixel: PixelPoint,
}

/// Full board view for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub pieces: Vec<PieceView>,
    pub current_turn: Color,
    pub game_over: bool,
    pub winner: Option<Color>,
    pub your_player: Role,
    pub cursors: PerColor<Cell>,
    pub selected_white: Option<PieceId>,
    pub selected_black: Option<PieceId>,
}

impl StateSnapshot {
    pub fn capture(session: &GameSession, your_player: Role, geometry: &BoardGeometry) -> Self {
        let pieces = session
            .pieces()
            .iter()
            .map(|piece| PieceView {
                id: piece.id().clone(),
                position: piece.cell(),
                kind: piece.kind(),
                color: piece.color(),
                pixel: geometry.cell_to_pixel(piece.cell()),
            })
            .collect();

        Self {
            pieces,
            current_turn: session.turn(),
            game_over: session.is_over(),
            winner: session.winner(),
            your_player,
            cursors: session.cursors().clone(),
            selected_white: session.selection(Color::White).cloned(),
            selected_black: session.selection(Color::Black).cloned(),
        }
    }
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn selection_update(session: &GameSession) -> Self {
        Self::SelectionUpdate {
            selected_white: session.selection(Color::White).cloned(),
            selected_black: session.selection(Color::Black).cloned(),
        }
    }
}

pub fn decode_client(text: &str) -> NetworkResult<ClientMessage> {
    serde_json::from_str(text).map_err(|e| NetworkError::deserialization_failed(e.to_string()))
}

pub fn encode_server(message: &ServerMessage) -> NetworkResult<String> {
    serde_json::to_string(message).map_err(|e| NetworkError::serialization_failed(e.to_string()))
}
