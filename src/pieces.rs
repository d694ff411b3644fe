use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::enums::{Color, PieceKind};
use crate::geometry::Cell;
use crate::ordered_hashmap::OrderedHashMap;

/// Stable piece identity: kind letter, color letter, ordinal (`PW3`, `KB0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceId(String);

impl PieceId {
    pub fn new(kind: PieceKind, color: Color, ordinal: u32) -> Self {
        Self(format!("{}{}{}", kind.letter(), color.letter(), ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn kind(&self) -> Option<PieceKind> {
        self.0.chars().next().and_then(PieceKind::from_letter)
    }

    /// Color encoded in the id, if it follows the `<kind><color><ordinal>` shape.
    pub fn color(&self) -> Option<Color> {
        match self.0.chars().nth(1) {
            Some('W') => Some(Color::White),
            Some('B') => Some(Color::Black),
            _ => None,
        }
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PieceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PieceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&PieceId> for PieceId {
    fn from(value: &PieceId) -> Self {
        value.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    id: PieceId,
    kind: PieceKind,
    color: Color,
    cell: Cell,
}

impl Piece {
    pub fn id(&self) -> &PieceId {
        &self.id
    }

    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    pub fn set_cell(&mut self, cell: Cell) {
        self.cell = cell;
    }
}

/// Starting position, Black on rows 0-1 and White on rows 6-7.
pub const STARTING_LAYOUT: [(PieceKind, Color, Cell); 32] = {
    use Color::{Black as B, White as W};
    use PieceKind::*;
    [
        (Rook, B, Cell::new(0, 0)),
        (Knight, B, Cell::new(1, 0)),
        (Bishop, B, Cell::new(2, 0)),
        (Queen, B, Cell::new(3, 0)),
        (King, B, Cell::new(4, 0)),
        (Bishop, B, Cell::new(5, 0)),
        (Knight, B, Cell::new(6, 0)),
        (Rook, B, Cell::new(7, 0)),
        (Pawn, B, Cell::new(0, 1)),
        (Pawn, B, Cell::new(1, 1)),
        (Pawn, B, Cell::new(2, 1)),
        (Pawn, B, Cell::new(3, 1)),
        (Pawn, B, Cell::new(4, 1)),
        (Pawn, B, Cell::new(5, 1)),
        (Pawn, B, Cell::new(6, 1)),
        (Pawn, B, Cell::new(7, 1)),
        (Pawn, W, Cell::new(0, 6)),
        (Pawn, W, Cell::new(1, 6)),
        (Pawn, W, Cell::new(2, 6)),
        (Pawn, W, Cell::new(3, 6)),
        (Pawn, W, Cell::new(4, 6)),
        (Pawn, W, Cell::new(5, 6)),
        (Pawn, W, Cell::new(6, 6)),
        (Pawn, W, Cell::new(7, 6)),
        (Rook, W, Cell::new(0, 7)),
        (Knight, W, Cell::new(1, 7)),
        (Bishop, W, Cell::new(2, 7)),
        (Queen, W, Cell::new(3, 7)),
        (King, W, Cell::new(4, 7)),
        (Bishop, W, Cell::new(5, 7)),
        (Knight, W, Cell::new(6, 7)),
        (Rook, W, Cell::new(7, 7)),
    ]
};

/// Hands out piece ids. Ordinals are monotonic per (kind, color), so ids are never reused.
#[derive(Debug, Default, Clone)]
pub struct PieceFactory {
    ordinals: HashMap<(PieceKind, Color), u32>,
}

impl PieceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, kind: PieceKind, color: Color, cell: Cell) -> Piece {
        let ordinal = self.ordinals.entry((kind, color)).or_insert(0);
        let id = PieceId::new(kind, color, *ordinal);
        *ordinal += 1;
        Piece {
            id,
            kind,
            color,
            cell,
        }
    }

    pub fn starting_registry(&mut self) -> PieceRegistry {
        let mut registry = PieceRegistry::new();
        for (kind, color, cell) in STARTING_LAYOUT {
            registry.insert(self.create(kind, color, cell));
        }
        registry
    }
}

/// The live pieces of one match, in creation order.
#[derive(Debug, Default, Clone)]
pub struct PieceRegistry {
    pieces: OrderedHashMap<PieceId, Piece>,
}

impl PieceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, piece: Piece) {
        self.pieces.insert(piece.id.clone(), piece);
    }

    pub fn remove(&mut self, id: &PieceId) -> Option<Piece> {
        self.pieces.remove(id)
    }

    pub fn get(&self, id: &PieceId) -> Option<&Piece> {
        self.pieces.get(id)
    }

    /// Moves a piece without any legality check. Returns false for unknown ids.
    pub fn relocate(&mut self, id: &PieceId, cell: Cell) -> bool {
        match self.pieces.get_mut(id) {
            Some(piece) => {
                piece.set_cell(cell);
                true
            }
            None => false,
        }
    }

    pub fn piece_at(&self, cell: Cell) -> Option<&Piece> {
        self.pieces.values().find(|piece| piece.cell == cell)
    }

    pub fn is_occupied(&self, cell: Cell) -> bool {
        self.piece_at(cell).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    pub fn of_color(&self, color: Color) -> impl Iterator<Item = &Piece> {
        self.iter().filter(move |piece| piece.color == color)
    }

    pub fn has_king(&self, color: Color) -> bool {
        self.of_color(color).any(|piece| piece.kind == PieceKind::King)
    }

    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_starting_registry() {
        let registry = PieceFactory::new().starting_registry();
        assert_eq!(registry.len(), 32);
        assert_eq!(registry.of_color(Color::White).count(), 16);

        let cells: HashSet<_> = registry.iter().map(|p| p.cell()).collect();
        assert_eq!(cells.len(), 32);

        let king = registry.get(&PieceId::from("KB0")).unwrap();
        assert_eq!(king.cell(), Cell::new(4, 0));
        let rook = registry.get(&PieceId::from("RW1")).unwrap();
        assert_eq!(rook.cell(), Cell::new(7, 7));
        assert_eq!(
            registry.piece_at(Cell::new(3, 6)).map(|p| p.id().as_str()),
            Some("PW3")
        );
    }

    #[test]
    fn test_factory_ordinals_never_repeat() {
        let mut factory = PieceFactory::new();
        let _registry = factory.starting_registry();
        let queen = factory.create(PieceKind::Queen, Color::White, Cell::new(4, 0));
        assert_eq!(queen.id().as_str(), "QW1");
        let next = factory.create(PieceKind::Queen, Color::White, Cell::new(5, 0));
        assert_eq!(next.id().as_str(), "QW2");
        assert_eq!(next.id().color(), Some(Color::White));
        assert_eq!(PieceId::from("?").color(), None);
    }

    #[test]
    fn test_relocate_and_remove() {
        let mut registry = PieceFactory::new().starting_registry();
        let pawn = PieceId::from("PW4");
        assert!(registry.relocate(&pawn, Cell::new(4, 5)));
        assert!(!registry.is_occupied(Cell::new(4, 6)));
        assert_eq!(registry.piece_at(Cell::new(4, 5)).map(|p| p.id()), Some(&pawn));

        assert!(registry.remove(&PieceId::from("KW0")).is_some());
        assert!(!registry.has_king(Color::White));
        assert!(registry.has_king(Color::Black));
        assert!(!registry.relocate(&PieceId::from("KW0"), Cell::new(0, 0)));
    }
}
