use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::enums::Color;
use crate::errors::{MatchId, SubscriberError};
use crate::events::{Event, EventKind, GameEvent, Subscriber};
use crate::geometry::Cell;
use crate::pieces::PieceId;

pub const MOVE_LOG_EVENTS: [EventKind; 4] = [
    EventKind::MatchStart,
    EventKind::PieceCaptured,
    EventKind::MoveCommitted,
    EventKind::MatchClosed,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub number: u32,
    pub piece: PieceId,
    pub color: Color,
    pub from: Cell,
    pub to: Cell,
    pub capture: bool,
    pub timestamp_ms: u64,
}

#[derive(Debug, Default)]
struct MatchHistory {
    records: Vec<MoveRecord>,
    // PieceCaptured arrives before the MoveCommitted of the same move.
    pending_capture: bool,
}

/// Ordered move history per match.
#[derive(Default)]
pub struct MoveLog {
    matches: Mutex<HashMap<MatchId, MatchHistory>>,
}

impl MoveLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self, match_id: &str) -> Option<Vec<MoveRecord>> {
        let matches = self.matches.lock().unwrap_or_else(|p| p.into_inner());
        matches.get(match_id).map(|history| history.records.clone())
    }
}

impl Subscriber for MoveLog {
    fn name(&self) -> &str {
        "move_log"
    }

    fn on_event(&self, event: &Event) -> Result<(), SubscriberError> {
        let mut matches = self.matches.lock().unwrap_or_else(|p| p.into_inner());
        match &event.payload {
            GameEvent::MatchStart => {
                matches.insert(event.match_id.clone(), MatchHistory::default());
            }
            GameEvent::PieceCaptured { .. } => {
                matches.entry(event.match_id.clone()).or_default().pending_capture = true;
            }
            GameEvent::MoveCommitted {
                piece,
                color,
                from,
                to,
            } => {
                let history = matches.entry(event.match_id.clone()).or_default();
                let record = MoveRecord {
                    number: history.records.len() as u32 + 1,
                    piece: piece.clone(),
                    color: *color,
                    from: *from,
                    to: *to,
                    capture: std::mem::take(&mut history.pending_capture),
                    timestamp_ms: event.timestamp_ms,
                };
                history.records.push(record);
            }
            GameEvent::MatchClosed => {
                matches.remove(&event.match_id);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::PieceKind;

    fn committed(piece: &str, color: Color, from: Cell, to: Cell) -> Event {
        Event::new(
            "m1",
            GameEvent::MoveCommitted {
                piece: PieceId::from(piece),
                color,
                from,
                to,
            },
        )
    }

    #[test]
    fn test_records_moves_in_order_with_capture_flag() {
        let log = MoveLog::new();
        log.on_event(&Event::new("m1", GameEvent::MatchStart)).unwrap();
        log.on_event(&committed("PW4", Color::White, Cell::new(4, 6), Cell::new(4, 5)))
            .unwrap();
        log.on_event(&Event::new(
            "m1",
            GameEvent::PieceCaptured {
                captured: PieceId::from("PW4"),
                captured_kind: PieceKind::Pawn,
                capturing: PieceId::from("NB0"),
                at: Cell::new(4, 5),
            },
        ))
        .unwrap();
        log.on_event(&committed("NB0", Color::Black, Cell::new(3, 3), Cell::new(4, 5)))
            .unwrap();

        let records = log.records("m1").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].number, 1);
        assert!(!records[0].capture);
        assert_eq!(records[1].number, 2);
        assert_eq!(records[1].piece, PieceId::from("NB0"));
        assert!(records[1].capture);
    }

    #[test]
    fn test_matches_are_kept_apart() {
        let log = MoveLog::new();
        log.on_event(&committed("PW0", Color::White, Cell::new(0, 6), Cell::new(0, 5)))
            .unwrap();
        assert_eq!(log.records("m2"), None);
        log.on_event(&Event::new("m1", GameEvent::MatchClosed)).unwrap();
        assert_eq!(log.records("m1"), None);
    }
}
