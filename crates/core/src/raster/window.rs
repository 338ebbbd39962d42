//! Rectangular windows in a grid's (row, col) index space

use serde::{Deserialize, Serialize};

/// A rectangle of cells: `rows` x `cols` starting at (`row`, `col`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CellWindow {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl CellWindow {
    pub fn new(row: usize, col: usize, rows: usize, cols: usize) -> Self {
        Self { row, col, rows, cols }
    }

    /// Window covering a whole `rows` x `cols` grid
    pub fn whole(rows: usize, cols: usize) -> Self {
        Self::new(0, 0, rows, cols)
    }

    /// One past the last row
    pub fn row_end(&self) -> usize {
        self.row + self.rows
    }

    /// One past the last column
    pub fn col_end(&self) -> usize {
        self.col + self.cols
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row && row < self.row_end() && col >= self.col && col < self.col_end()
    }

    /// Whether `other` lies entirely inside this window
    pub fn contains_window(&self, other: &CellWindow) -> bool {
        other.row >= self.row
            && other.col >= self.col
            && other.row_end() <= self.row_end()
            && other.col_end() <= self.col_end()
    }

    /// Overlap of two windows, `None` when they do not share a cell
    pub fn intersect(&self, other: &CellWindow) -> Option<CellWindow> {
        let row = self.row.max(other.row);
        let col = self.col.max(other.col);
        let row_end = self.row_end().min(other.row_end());
        let col_end = self.col_end().min(other.col_end());
        if row_end <= row || col_end <= col {
            return None;
        }
        Some(CellWindow::new(row, col, row_end - row, col_end - col))
    }

    /// Cells of the window in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize)> + use<> {
        let (row, col, row_end, col_end) = (self.row, self.col, self.row_end(), self.col_end());
        (row..row_end).flat_map(move |r| (col..col_end).map(move |c| (r, c)))
    }
}
