//! The wall: the grid of cells left behind by docked shapes.

use crate::codec::WireError;
use crate::shape::{Motion, Shape, ShapeType};
use crate::{COLS, ROWS};
use serde::{Deserialize, Serialize};

/// Grid of docked cells plus the cached stack height of every column.
///
/// A cell holds `0` when empty, otherwise the [`ShapeType::id`] of the shape
/// that docked there. Everything above the tallest column is always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wall {
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
    heights: Vec<usize>,
}

impl Default for Wall {
    fn default() -> Self {
        Self::new()
    }
}

impl Wall {
    pub fn new() -> Self {
        Self::with_size(ROWS, COLS)
    }

    pub fn with_size(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![0; rows * cols],
            heights: vec![0; cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn cell(&self, col: usize, row: usize) -> u8 {
        self.cells[row * self.cols + col]
    }

    pub fn is_occupied(&self, col: usize, row: usize) -> bool {
        self.cell(col, row) != 0
    }

    /// Writes a single cell and refreshes that column's height.
    pub fn set_cell(&mut self, col: usize, row: usize, value: u8) {
        self.cells[row * self.cols + col] = value;
        self.update_height(col);
    }

    pub fn row(&self, row: usize) -> &[u8] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    pub fn tower_height(&self, col: usize) -> usize {
        self.heights[col]
    }

    pub fn highest_tower(&self) -> usize {
        self.heights.iter().copied().max().unwrap_or(0)
    }

    /// Merges a docked shape into the grid.
    ///
    /// Returns `false` when a cell lands in a column that is already stacked
    /// to the top, which ends the game. Cells written before that point stay.
    pub fn put_shape(&mut self, shape: &Shape) -> bool {
        let value = shape.shape_type().id();
        for (col, row) in shape.cells() {
            if col < 0 || col as usize >= self.cols || row < 0 || row as usize >= self.rows {
                continue;
            }
            let (col, row) = (col as usize, row as usize);
            if self.heights[col] >= self.rows {
                return false;
            }
            self.set_cell(col, row, value);
        }
        true
    }

    /// Removes every full row and returns how many were removed.
    ///
    /// Only the band between the tallest column and the floor is scanned and
    /// shifted.
    pub fn check_rows(&mut self) -> usize {
        let highest = self.highest_tower();
        let top = self.rows - highest;
        let mut deleted = 0;

        for row in top..self.rows {
            if self.row(row).iter().all(|cell| *cell != 0) {
                self.delete_row(row, top);
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.update_heights();
        }
        deleted
    }

    /// Shifts rows `top..row` down by one and clears row `top`.
    fn delete_row(&mut self, row: usize, top: usize) {
        let cols = self.cols;
        self.cells.copy_within(top * cols..row * cols, (top + 1) * cols);
        self.cells[top * cols..(top + 1) * cols].fill(0);
    }

    /// Whether `shape` rests on the floor or on a docked cell.
    pub fn is_shape_docked(&self, shape: &Shape) -> bool {
        if shape.bottom_y() >= self.rows as i32 - 1 {
            return true;
        }
        shape.cells().any(|(col, row)| {
            let below = row + 1;
            if below >= self.rows as i32 {
                return true;
            }
            col >= 0
                && (col as usize) < self.cols
                && below >= 0
                && self.is_occupied(col as usize, below as usize)
        })
    }

    /// Whether `shape`, after `motion`, would leave the game area or overlap
    /// a docked cell. The shape itself is not moved.
    pub fn collides_with(&self, shape: &Shape, motion: Motion) -> bool {
        let moved = shape.moved(motion);
        if moved.x() < 0
            || moved.x() + moved.width() > self.cols as i32
            || moved.y() + moved.height() > self.rows as i32
        {
            return true;
        }
        let hit = moved
            .cells()
            .any(|(col, row)| row >= 0 && self.is_occupied(col as usize, row as usize));
        hit
    }

    fn update_height(&mut self, col: usize) {
        self.heights[col] = (0..self.rows)
            .find(|row| self.is_occupied(col, *row))
            .map(|row| self.rows - row)
            .unwrap_or(0);
    }

    fn update_heights(&mut self) {
        for col in 0..self.cols {
            self.update_height(col);
        }
    }

    pub fn snapshot(&self) -> WallSnapshot {
        WallSnapshot {
            rows: self.rows as u32,
            cols: self.cols as u32,
            cells: self.cells.clone(),
        }
    }
}

/// Wire copy of a [`Wall`]. Column heights are derived on arrival.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallSnapshot {
    pub rows: u32,
    pub cols: u32,
    pub cells: Vec<u8>,
}

impl TryFrom<WallSnapshot> for Wall {
    type Error = WireError;

    fn try_from(snapshot: WallSnapshot) -> Result<Self, Self::Error> {
        let (rows, cols) = (snapshot.rows as usize, snapshot.cols as usize);
        if rows != ROWS || cols != COLS {
            return Err(WireError::MalformedFrame(format!(
                "wall snapshot of {}x{}, expected {}x{}",
                rows, cols, ROWS, COLS
            )));
        }
        if snapshot.cells.len() != rows * cols {
            return Err(WireError::MalformedFrame(format!(
                "wall snapshot of {}x{} carries {} cells",
                rows,
                cols,
                snapshot.cells.len()
            )));
        }
        if let Some(bad) = snapshot
            .cells
            .iter()
            .find(|cell| **cell != 0 && ShapeType::from_id(**cell).is_none())
        {
            return Err(WireError::MalformedFrame(format!(
                "wall snapshot holds unknown cell value {}",
                bad
            )));
        }

        let mut wall = Wall {
            rows,
            cols,
            cells: snapshot.cells,
            heights: vec![0; cols],
        };
        wall.update_heights();
        Ok(wall)
    }
}
