use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::enums::Color;
use crate::errors::{MatchId, SubscriberError};
use crate::events::{Event, EventKind, GameEvent, Subscriber};
use crate::session::PerColor;

pub const SCORE_EVENTS: [EventKind; 3] = [
    EventKind::MatchStart,
    EventKind::PieceCaptured,
    EventKind::MatchClosed,
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub white: u32,
    pub black: u32,
    pub captures_white: u32,
    pub captures_black: u32,
    /// White score minus Black score.
    pub difference: i64,
    pub leader: Option<Color>,
}

#[derive(Debug, Default, Clone)]
struct MatchScore {
    points: PerColor<u32>,
    captures: PerColor<u32>,
}

impl MatchScore {
    fn summary(&self) -> ScoreSummary {
        let difference = self.points.white as i64 - self.points.black as i64;
        let leader = match difference {
            d if d > 0 => Some(Color::White),
            d if d < 0 => Some(Color::Black),
            _ => None,
        };
        ScoreSummary {
            white: self.points.white,
            black: self.points.black,
            captures_white: self.captures.white,
            captures_black: self.captures.black,
            difference,
            leader,
        }
    }
}

/// Material captured per color, per match.
#[derive(Default)]
pub struct ScoreBoard {
    matches: Mutex<HashMap<MatchId, MatchScore>>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self, match_id: &str) -> Option<ScoreSummary> {
        let matches = self.matches.lock().unwrap_or_else(|p| p.into_inner());
        matches.get(match_id).map(MatchScore::summary)
    }
}

impl Subscriber for ScoreBoard {
    fn name(&self) -> &str {
        "score_board"
    }

    fn on_event(&self, event: &Event) -> Result<(), SubscriberError> {
        let mut matches = self.matches.lock().unwrap_or_else(|p| p.into_inner());
        match &event.payload {
            GameEvent::MatchStart => {
                matches.insert(event.match_id.clone(), MatchScore::default());
            }
            GameEvent::PieceCaptured {
                captured,
                captured_kind,
                ..
            } => {
                let scorer = captured.color().map(Color::opposite).ok_or_else(|| {
                    SubscriberError::failed(self.name(), format!("malformed piece id {captured}"))
                })?;
                let score = matches.entry(event.match_id.clone()).or_default();
                *score.points.get_mut(scorer) += captured_kind.value();
                *score.captures.get_mut(scorer) += 1;
                log::debug!(
                    "🧮 {} scores {} in match {}",
                    scorer,
                    captured_kind.value(),
                    event.match_id
                );
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
    use crate::geometry::Cell;
    use crate::pieces::PieceId;

    fn capture(captured: &str, kind: PieceKind) -> Event {
        Event::new(
            "m1",
            GameEvent::PieceCaptured {
                captured: PieceId::from(captured),
                captured_kind: kind,
                capturing: PieceId::from("NW0"),
                at: Cell::new(3, 3),
            },
        )
    }

    #[test]
    fn test_scores_follow_piece_values() {
        let board = ScoreBoard::new();
        board.on_event(&Event::new("m1", GameEvent::MatchStart)).unwrap();
        assert_eq!(board.summary("m1"), Some(ScoreSummary::default()));

        board.on_event(&capture("QB0", PieceKind::Queen)).unwrap();
        board.on_event(&capture("PB3", PieceKind::Pawn)).unwrap();
        board.on_event(&capture("RW0", PieceKind::Rook)).unwrap();

        let summary = board.summary("m1").unwrap();
        assert_eq!(summary.white, 10);
        assert_eq!(summary.black, 5);
        assert_eq!(summary.captures_white, 2);
        assert_eq!(summary.captures_black, 1);
        assert_eq!(summary.difference, 5);
        assert_eq!(summary.leader, Some(Color::White));
    }

    #[test]
    fn test_match_closed_drops_state() {
        let board = ScoreBoard::new();
        board.on_event(&capture("PW0", PieceKind::Pawn)).unwrap();
        assert_eq!(board.summary("m1").unwrap().leader, Some(Color::Black));
        board
            .on_event(&Event::new("m1", GameEvent::MatchClosed))
            .unwrap();
        assert_eq!(board.summary("m1"), None);
    }

    #[test]
    fn test_malformed_id_is_reported() {
        let board = ScoreBoard::new();
        assert!(board.on_event(&capture("?", PieceKind::Pawn)).is_err());
    }
}
