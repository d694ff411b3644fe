use crate::enums::PieceKind;
use crate::geometry::Cell;
use crate::pieces::{Piece, PieceRegistry};

const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

const KING_OFFSETS: [(i8, i8); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Decides whether `piece` may move to `target` given the current board.
///
/// Checks bounds, then same-color occupancy, then the movement pattern of the piece kind,
/// and finally for sliding pieces that every square strictly between source and target is
/// empty. Pure; never mutates the registry.
pub fn is_legal(piece: &Piece, target: Cell, registry: &PieceRegistry) -> bool {
    if !target.in_bounds() {
        return false;
    }
    if let Some(occupant) = registry.piece_at(target) {
        if occupant.color() == piece.color() {
            return false;
        }
    }

    let (dc, dr) = piece.cell().delta_to(target);
    if !matches_pattern(piece, dc, dr) {
        return false;
    }

    if piece.kind().is_sliding() {
        path_is_clear(piece.cell(), target, registry)
    } else {
        true
    }
}

fn matches_pattern(piece: &Piece, dc: i8, dr: i8) -> bool {
    match piece.kind() {
        PieceKind::Pawn => dc == 0 && dr == piece.color().forward(),
        PieceKind::Knight => KNIGHT_OFFSETS.contains(&(dc, dr)),
        PieceKind::King => KING_OFFSETS.contains(&(dc, dr)),
        PieceKind::Rook => is_straight(dc, dr),
        PieceKind::Bishop => is_diagonal(dc, dr),
        PieceKind::Queen => is_straight(dc, dr) || is_diagonal(dc, dr),
    }
}

fn is_straight(dc: i8, dr: i8) -> bool {
    (dc == 0) != (dr == 0)
}

fn is_diagonal(dc: i8, dr: i8) -> bool {
    dc != 0 && dc.abs() == dr.abs()
}

/// True when no piece sits strictly between `from` and `to` on their shared line.
pub fn path_is_clear(from: Cell, to: Cell, registry: &PieceRegistry) -> bool {
    let mut current = from.step_towards(to);
    while current != to {
        if registry.is_occupied(current) {
            return false;
        }
        current = current.step_towards(to);
    }
    true
}

/// Every cell `piece` could legally move to.
pub fn legal_targets(piece: &Piece, registry: &PieceRegistry) -> Vec<Cell> {
    Cell::all()
        .filter(|cell| *cell != piece.cell())
        .filter(|cell| is_legal(piece, *cell, registry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Color;
    use crate::pieces::PieceFactory;

    fn board(pieces: &[(PieceKind, Color, Cell)]) -> (PieceRegistry, Vec<Piece>) {
        let mut factory = PieceFactory::new();
        let mut registry = PieceRegistry::new();
        let mut created = Vec::new();
        for &(kind, color, cell) in pieces {
            let piece = factory.create(kind, color, cell);
            created.push(piece.clone());
            registry.insert(piece);
        }
        (registry, created)
    }

    #[test]
    fn test_rook_path_blocking() {
        let target = Cell::new(3, 0);
        let (registry, pieces) = board(&[(PieceKind::Rook, Color::White, Cell::new(0, 0))]);
        assert!(is_legal(&pieces[0], target, &registry));

        for blocker in [Cell::new(1, 0), Cell::new(2, 0)] {
            for color in [Color::White, Color::Black] {
                let (registry, pieces) = board(&[
                    (PieceKind::Rook, Color::White, Cell::new(0, 0)),
                    (PieceKind::Pawn, color, blocker),
                ]);
                assert!(!is_legal(&pieces[0], target, &registry));
            }
        }
    }

    #[test]
    fn test_blocked_path_beats_capturable_target() {
        let (registry, pieces) = board(&[
            (PieceKind::Rook, Color::White, Cell::new(0, 0)),
            (PieceKind::Pawn, Color::Black, Cell::new(1, 0)),
            (PieceKind::Knight, Color::Black, Cell::new(3, 0)),
        ]);
        assert!(!is_legal(&pieces[0], Cell::new(3, 0), &registry));
        assert!(is_legal(&pieces[0], Cell::new(1, 0), &registry));
    }

    #[test]
    fn test_knight_jumps_over_pieces() {
        let (registry, pieces) = board(&[
            (PieceKind::Knight, Color::White, Cell::new(1, 1)),
            (PieceKind::Pawn, Color::White, Cell::new(2, 1)),
            (PieceKind::Pawn, Color::Black, Cell::new(2, 2)),
        ]);
        assert!(is_legal(&pieces[0], Cell::new(3, 2), &registry));
        assert!(!is_legal(&pieces[0], Cell::new(3, 3), &registry));
    }

    #[test]
    fn test_no_self_capture() {
        let (registry, pieces) = board(&[
            (PieceKind::Queen, Color::Black, Cell::new(3, 3)),
            (PieceKind::Pawn, Color::Black, Cell::new(5, 5)),
            (PieceKind::Pawn, Color::White, Cell::new(3, 6)),
        ]);
        assert!(!is_legal(&pieces[0], Cell::new(5, 5), &registry));
        assert!(is_legal(&pieces[0], Cell::new(3, 6), &registry));
    }

    #[test]
    fn test_pawn_single_forward_step() {
        let (registry, pieces) = board(&[
            (PieceKind::Pawn, Color::White, Cell::new(4, 6)),
            (PieceKind::Pawn, Color::Black, Cell::new(4, 1)),
        ]);
        let white = &pieces[0];
        assert!(is_legal(white, Cell::new(4, 5), &registry));
        assert!(!is_legal(white, Cell::new(4, 4), &registry));
        assert!(!is_legal(white, Cell::new(4, 7), &registry));
        assert!(!is_legal(white, Cell::new(5, 5), &registry));

        let black = &pieces[1];
        assert!(is_legal(black, Cell::new(4, 2), &registry));
        assert!(!is_legal(black, Cell::new(4, 0), &registry));
    }

    #[test]
    fn test_bounds_and_patterns() {
        let (registry, pieces) = board(&[
            (PieceKind::King, Color::White, Cell::new(0, 0)),
            (PieceKind::Bishop, Color::White, Cell::new(7, 7)),
        ]);
        let king = &pieces[0];
        assert!(!is_legal(king, Cell::new(-1, 0), &registry));
        assert!(is_legal(king, Cell::new(1, 1), &registry));
        assert!(!is_legal(king, Cell::new(2, 0), &registry));

        let bishop = &pieces[1];
        assert!(is_legal(bishop, Cell::new(1, 1), &registry));
        assert!(!is_legal(bishop, Cell::new(7, 3), &registry));
        assert!(!is_legal(bishop, Cell::new(0, 0), &registry));
    }

    #[test]
    fn test_legal_targets_from_start() {
        let registry = PieceFactory::new().starting_registry();
        let knight = registry.piece_at(Cell::new(1, 7)).unwrap();
        let mut targets = legal_targets(knight, &registry);
        targets.sort_by_key(|c| (c.col, c.row));
        assert_eq!(targets, vec![Cell::new(0, 5), Cell::new(2, 5)]);

        let rook = registry.piece_at(Cell::new(0, 7)).unwrap();
        assert!(legal_targets(rook, &registry).is_empty());
    }
}
