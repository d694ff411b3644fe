//! One match's state machine.
//!
//! A `GameSession` owns its piece registry, the turn color, the seats and the
//! per-player cursor/selection. It performs no I/O: every operation is an
//! in-memory mutation plus events published on the injected feed. Exactly one
//! task (the session runner) ever holds it mutably.

use serde::Serialize;
use std::sync::Arc;

use crate::enums::{Color, PieceKind, Role, COLORS};
use crate::errors::{ConnectionId, MatchId, SessionError, SessionResult};
use crate::events::{EventFeed, GameEvent};
use crate::geometry::Cell;
use crate::pieces::{Piece, PieceFactory, PieceId, PieceRegistry};
use crate::rules;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Over { winner: Color },
}

/// Per-color value, used for seats, cursors and selections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PerColor<T> {
    pub white: T,
    pub black: T,
}

impl<T> PerColor<T> {
    pub fn get(&self, color: Color) -> &T {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn get_mut(&mut self, color: Color) -> &mut T {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }
}

/// What an accepted move did to the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub piece: PieceId,
    pub color: Color,
    pub from: Cell,
    pub to: Cell,
    pub captured: Option<PieceId>,
    pub promoted_to: Option<PieceId>,
    pub winner: Option<Color>,
}

pub struct GameSession {
    match_id: MatchId,
    feed: Arc<EventFeed>,
    factory: PieceFactory,
    pieces: PieceRegistry,
    turn: Color,
    status: SessionStatus,
    seats: PerColor<Option<ConnectionId>>,
    spectators: Vec<ConnectionId>,
    cursors: PerColor<Cell>,
    selections: PerColor<Option<PieceId>>,
    started: bool,
}

impl GameSession {
    pub fn new(match_id: impl Into<MatchId>, feed: Arc<EventFeed>) -> Self {
        let mut factory = PieceFactory::new();
        let pieces = factory.starting_registry();
        Self::with_pieces(match_id, feed, factory, pieces)
    }

    /// Session over an arbitrary position. Ids are assigned in `layout` order.
    pub fn from_layout(
        match_id: impl Into<MatchId>,
        feed: Arc<EventFeed>,
        layout: &[(PieceKind, Color, Cell)],
    ) -> Self {
        let mut factory = PieceFactory::new();
        let mut pieces = PieceRegistry::new();
        for &(kind, color, cell) in layout {
            pieces.insert(factory.create(kind, color, cell));
        }
        Self::with_pieces(match_id, feed, factory, pieces)
    }

    fn with_pieces(
        match_id: impl Into<MatchId>,
        feed: Arc<EventFeed>,
        factory: PieceFactory,
        pieces: PieceRegistry,
    ) -> Self {
        Self {
            match_id: match_id.into(),
            feed,
            factory,
            pieces,
            turn: Color::White,
            status: SessionStatus::Active,
            seats: PerColor::default(),
            spectators: Vec::new(),
            cursors: PerColor {
                white: Cell::new(0, 7),
                black: Cell::new(0, 0),
            },
            selections: PerColor::default(),
            started: false,
        }
    }

    /// Publishes MatchStart. Later calls do nothing.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        log::info!("♟️ Match {} started", self.match_id);
        self.feed.emit(&self.match_id, GameEvent::MatchStart);
    }

    /// Publishes MatchClosed so per-match observers can drop their state.
    pub fn close(&mut self) {
        log::info!("🧹 Match {} closed", self.match_id);
        self.feed.emit(&self.match_id, GameEvent::MatchClosed);
    }

    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    pub fn pieces(&self) -> &PieceRegistry {
        &self.pieces
    }

    pub fn piece(&self, id: &PieceId) -> Option<&Piece> {
        self.pieces.get(id)
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn is_over(&self) -> bool {
        matches!(self.status, SessionStatus::Over { .. })
    }

    pub fn winner(&self) -> Option<Color> {
        match self.status {
            SessionStatus::Over { winner } => Some(winner),
            SessionStatus::Active => None,
        }
    }

    pub fn cursor(&self, color: Color) -> Cell {
        *self.cursors.get(color)
    }

    pub fn cursors(&self) -> &PerColor<Cell> {
        &self.cursors
    }

    pub fn selection(&self, color: Color) -> Option<&PieceId> {
        self.selections.get(color).as_ref()
    }

    pub fn player(&self, color: Color) -> Option<&ConnectionId> {
        self.seats.get(color).as_ref()
    }

    pub fn role_of(&self, connection_id: &str) -> Option<Role> {
        if self.seats.white.as_deref() == Some(connection_id) {
            Some(Role::White)
        } else if self.seats.black.as_deref() == Some(connection_id) {
            Some(Role::Black)
        } else if self.spectators.iter().any(|c| c == connection_id) {
            Some(Role::Spectator)
        } else {
            None
        }
    }

    /// Seats `connection_id` in the given role. An occupied color slot demotes the
    /// newcomer to spectator; the resulting role is returned.
    pub fn attach(&mut self, connection_id: impl Into<ConnectionId>, role: Role) -> Role {
        let connection_id = connection_id.into();
        if let Some(existing) = self.role_of(&connection_id) {
            return existing;
        }
        let role = match role.color() {
            Some(color) if self.seats.get(color).is_none() => {
                *self.seats.get_mut(color) = Some(connection_id.clone());
                role
            }
            _ => {
                self.spectators.push(connection_id.clone());
                Role::Spectator
            }
        };
        log::info!(
            "🪑 {} joined match {} as {}",
            connection_id,
            self.match_id,
            role
        );
        role
    }

    /// Frees whatever seat the connection held. Returns its former role.
    pub fn handle_disconnect(&mut self, connection_id: &str) -> Option<Role> {
        let role = self.role_of(connection_id)?;
        match role.color() {
            Some(color) => {
                *self.seats.get_mut(color) = None;
                *self.selections.get_mut(color) = None;
            }
            None => self.spectators.retain(|c| c != connection_id),
        }
        log::info!(
            "🚪 {} ({}) left match {}",
            connection_id,
            role,
            self.match_id
        );
        Some(role)
    }

    /// True once both player slots are empty.
    pub fn is_empty(&self) -> bool {
        self.seats.white.is_none() && self.seats.black.is_none()
    }

    /// Records the piece at `cell` as `color`'s selection. Empty cells and
    /// opponent pieces are ignored. Returns whether the selection changed.
    pub fn select_piece(&mut self, color: Color, cell: Cell) -> bool {
        let Some(piece) = self.pieces.piece_at(cell) else {
            return false;
        };
        if piece.color() != color {
            return false;
        }
        let id = piece.id().clone();
        let slot = self.selections.get_mut(color);
        if slot.as_ref() == Some(&id) {
            return false;
        }
        log::debug!("👆 {} selected {} in match {}", color, id, self.match_id);
        *slot = Some(id);
        true
    }

    pub fn move_cursor(&mut self, color: Color, dc: i8, dr: i8) -> Cell {
        let cursor = self.cursors.get_mut(color);
        *cursor = cursor.offset(dc, dr).clamped();
        *cursor
    }

    pub fn legal_targets(&self, piece_id: &PieceId) -> SessionResult<Vec<Cell>> {
        let piece = self
            .pieces
            .get(piece_id)
            .ok_or_else(|| SessionError::unknown_piece(piece_id))?;
        Ok(rules::legal_targets(piece, &self.pieces))
    }

    /// Validates and applies a move for `color`. Any rejection leaves the session untouched.
    pub fn attempt_move(
        &mut self,
        color: Color,
        piece_id: &PieceId,
        target: Cell,
    ) -> SessionResult<MoveOutcome> {
        if self.is_over() {
            return Err(SessionError::GameOver);
        }
        if color != self.turn {
            return Err(SessionError::turn_violation(self.turn, color));
        }
        let piece = self
            .pieces
            .get(piece_id)
            .ok_or_else(|| SessionError::unknown_piece(piece_id))?;
        if piece.color() != color {
            return Err(SessionError::NotYourPiece {
                piece_id: piece_id.clone(),
            });
        }
        if !rules::is_legal(piece, target, &self.pieces) {
            return Err(SessionError::illegal_move(piece_id, target));
        }

        let from = piece.cell();
        let kind = piece.kind();
        Ok(self.apply_move(color, piece_id.clone(), kind, from, target))
    }

    fn apply_move(
        &mut self,
        color: Color,
        piece_id: PieceId,
        kind: PieceKind,
        from: Cell,
        to: Cell,
    ) -> MoveOutcome {
        let mut outcome = MoveOutcome {
            piece: piece_id.clone(),
            color,
            from,
            to,
            captured: None,
            promoted_to: None,
            winner: None,
        };

        let mut captured_king = None;
        let occupant = self.pieces.piece_at(to).map(|p| p.id().clone());
        if let Some(captured_id) = occupant {
            if let Some(captured) = self.pieces.remove(&captured_id) {
                log::info!(
                    "⚔️ {} captured {} at {} in match {}",
                    piece_id,
                    captured_id,
                    to,
                    self.match_id
                );
                self.feed.emit(
                    &self.match_id,
                    GameEvent::PieceCaptured {
                        captured: captured_id.clone(),
                        captured_kind: captured.kind(),
                        capturing: piece_id.clone(),
                        at: to,
                    },
                );
                if captured.kind() == PieceKind::King {
                    captured_king = Some((captured_id.clone(), captured.color()));
                }
                outcome.captured = Some(captured_id);
            }
        }

        self.pieces.relocate(&piece_id, to);

        if kind == PieceKind::Pawn && to.row == color.promotion_row() {
            self.pieces.remove(&piece_id);
            let queen = self.factory.create(PieceKind::Queen, color, to);
            let queen_id = queen.id().clone();
            self.pieces.insert(queen);
            log::info!(
                "👑 {} promoted to {} at {} in match {}",
                piece_id,
                queen_id,
                to,
                self.match_id
            );
            self.feed.emit(
                &self.match_id,
                GameEvent::PawnPromoted {
                    pawn: piece_id.clone(),
                    queen: queen_id.clone(),
                    at: to,
                },
            );
            outcome.promoted_to = Some(queen_id);
        }

        self.clear_stale_selections(&outcome);
        self.turn = self.turn.opposite();
        log::info!(
            "✅ {} {} {} -> {} in match {}",
            color,
            piece_id,
            from,
            to,
            self.match_id
        );
        self.feed.emit(
            &self.match_id,
            GameEvent::MoveCommitted {
                piece: piece_id,
                color,
                from,
                to,
            },
        );

        if let Some((king, loser)) = captured_king.filter(|(_, loser)| !self.pieces.has_king(*loser)) {
            let winner = loser.opposite();
            self.status = SessionStatus::Over { winner };
            outcome.winner = Some(winner);
            log::info!("🏆 {} wins match {}", winner, self.match_id);
            self.feed
                .emit(&self.match_id, GameEvent::KingCaptured { king, by: winner });
            self.feed
                .emit(&self.match_id, GameEvent::MatchEnd { winner });
        }

        outcome
    }

    fn clear_stale_selections(&mut self, outcome: &MoveOutcome) {
        for color in COLORS {
            let slot = self.selections.get_mut(color);
            let stale = slot
                .as_ref()
                .is_some_and(|id| *id == outcome.piece || outcome.captured.as_ref() == Some(id));
            if stale {
                *slot = None;
            }
        }
    }
}
