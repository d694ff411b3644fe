use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BOARD_SIZE: i8 = 8;

/// A square on the board. Serialized as `[col, row]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i8; 2]", into = "[i8; 2]")]
pub struct Cell {
    pub col: i8,
    pub row: i8,
}

impl Cell {
    pub const fn new(col: i8, row: i8) -> Self {
        Self { col, row }
    }

    pub fn in_bounds(self) -> bool {
        (0..BOARD_SIZE).contains(&self.col) && (0..BOARD_SIZE).contains(&self.row)
    }

    pub fn offset(self, dc: i8, dr: i8) -> Self {
        Self::new(self.col.saturating_add(dc), self.row.saturating_add(dr))
    }

    /// Signed distance from `self` to `other`.
    pub fn delta_to(self, other: Cell) -> (i8, i8) {
        (other.col - self.col, other.row - self.row)
    }

    /// Next cell on the straight or diagonal line towards `target`.
    pub fn step_towards(self, target: Cell) -> Self {
        let (dc, dr) = self.delta_to(target);
        self.offset(dc.signum(), dr.signum())
    }

    pub fn clamped(self) -> Self {
        Self::new(
            self.col.clamp(0, BOARD_SIZE - 1),
            self.row.clamp(0, BOARD_SIZE - 1),
        )
    }

    /// Every cell on the board, column-major.
    pub fn all() -> impl Iterator<Item = Cell> {
        iproduct!(0..BOARD_SIZE, 0..BOARD_SIZE).map(|(col, row)| Cell::new(col, row))
    }
}

impl From<[i8; 2]> for Cell {
    fn from([col, row]: [i8; 2]) -> Self {
        Self::new(col, row)
    }
}

impl From<Cell> for [i8; 2] {
    fn from(cell: Cell) -> Self {
        [cell.col, cell.row]
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

/// Top-left pixel corner of a cell on the rendered board
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

/// Stateless mapping between board cells and pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardGeometry {
    pub cell_width_px: f64,
    pub cell_height_px: f64,
    pub cols: i8,
    pub rows: i8,
}

impl Default for BoardGeometry {
    fn default() -> Self {
        Self::new(102.75, 103.5)
    }
}

impl BoardGeometry {
    pub fn new(cell_width_px: f64, cell_height_px: f64) -> Self {
        Self {
            cell_width_px,
            cell_height_px,
            cols: BOARD_SIZE,
            rows: BOARD_SIZE,
        }
    }

    pub fn cell_to_pixel(&self, cell: Cell) -> PixelPoint {
        PixelPoint {
            x: cell.col as f64 * self.cell_width_px,
            y: cell.row as f64 * self.cell_height_px,
        }
    }

    pub fn pixel_to_cell(&self, point: PixelPoint) -> Option<Cell> {
        if point.x < 0.0 || point.y < 0.0 {
            return None;
        }
        let col = (point.x / self.cell_width_px).floor();
        let row = (point.y / self.cell_height_px).floor();
        if col >= self.cols as f64 || row >= self.rows as f64 {
            return None;
        }
        Some(Cell::new(col as i8, row as i8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_serializes_as_pair() {
        let cell = Cell::new(4, 6);
        assert_eq!(serde_json::to_string(&cell).unwrap(), "[4,6]");
        let parsed: Cell = serde_json::from_str("[3,0]").unwrap();
        assert_eq!(parsed, Cell::new(3, 0));
    }

    #[test]
    fn test_bounds_and_clamp() {
        assert!(Cell::new(0, 0).in_bounds());
        assert!(Cell::new(7, 7).in_bounds());
        assert!(!Cell::new(8, 0).in_bounds());
        assert!(!Cell::new(0, -1).in_bounds());
        assert_eq!(Cell::new(-3, 9).clamped(), Cell::new(0, 7));
        assert_eq!(Cell::all().count(), 64);
    }

    #[test]
    fn test_step_towards() {
        let from = Cell::new(0, 0);
        assert_eq!(from.step_towards(Cell::new(3, 0)), Cell::new(1, 0));
        assert_eq!(from.step_towards(Cell::new(4, 4)), Cell::new(1, 1));
        assert_eq!(Cell::new(5, 5).step_towards(Cell::new(5, 1)), Cell::new(5, 4));
    }

    #[test]
    fn test_cell_pixel_mapping() {
        let geometry = BoardGeometry::default();
        let pixel = geometry.cell_to_pixel(Cell::new(2, 3));
        assert!((pixel.x - 205.5).abs() < 1e-9);
        assert!((pixel.y - 310.5).abs() < 1e-9);

        let inside = PixelPoint {
            x: pixel.x + 10.0,
            y: pixel.y + 10.0,
        };
        assert_eq!(geometry.pixel_to_cell(inside), Some(Cell::new(2, 3)));
        assert_eq!(geometry.pixel_to_cell(PixelPoint { x: -1.0, y: 5.0 }), None);
        assert_eq!(
            geometry.pixel_to_cell(PixelPoint { x: 900.0, y: 5.0 }),
            None
        );
    }
}
