//! Neighborhood shapes for focal operations

use serde::{Deserialize, Serialize};

/// Defines a neighborhood pattern around a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Neighborhood {
    /// 3x3 neighborhood (8 neighbors + center)
    Queen3x3,
    /// 3x3 without corners (4 neighbors + center)
    Rook3x3,
    /// Square neighborhood of given radius
    Square(usize),
    /// Circular neighborhood of given radius (in cells)
    Circle(usize),
}

impl Neighborhood {
    /// Get the radius of the neighborhood
    pub fn radius(&self) -> usize {
        match self {
            Neighborhood::Queen3x3 | Neighborhood::Rook3x3 => 1,
            Neighborhood::Square(r) | Neighborhood::Circle(r) => *r,
        }
    }

    /// Width and height of the bounding square
    pub fn size(&self) -> usize {
        self.radius() * 2 + 1
    }

    /// Check if a relative position is within this neighborhood
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        match self {
            Neighborhood::Queen3x3 => dr.abs() <= 1 && dc.abs() <= 1,
            Neighborhood::Rook3x3 => (dr.abs() <= 1 && dc == 0) || (dr == 0 && dc.abs() <= 1),
            Neighborhood::Square(r) => {
                let r = *r as isize;
                dr.abs() <= r && dc.abs() <= r
            }
            Neighborhood::Circle(r) => ((dr * dr + dc * dc) as f64).sqrt() <= *r as f64,
        }
    }

    /// Relative positions in this neighborhood, row-major
    pub fn offsets(&self) -> Vec<(isize, isize)> {
        let r = self.radius() as isize;
        (-r..=r)
            .flat_map(|dr| (-r..=r).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| self.contains(dr, dc))
            .collect()
    }

    /// Offsets excluding the center cell
    pub fn offsets_no_center(&self) -> Vec<(isize, isize)> {
        self.offsets()
            .into_iter()
            .filter(|&(dr, dc)| dr != 0 || dc != 0)
            .collect()
    }
}

/// The 8-connected moves used by propagation algorithms.
pub mod steps {
    use std::f64::consts::SQRT_2;

    /// (row_offset, col_offset, distance in cells)
    pub const MOVES: [(isize, isize, f64); 8] = [
        (-1, -1, SQRT_2),
        (-1, 0, 1.0),
        (-1, 1, SQRT_2),
        (0, -1, 1.0),
        (0, 1, 1.0),
        (1, -1, SQRT_2),
        (1, 0, 1.0),
        (1, 1, SQRT_2),
    ];
}
