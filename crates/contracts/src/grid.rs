//! Grid - the fixed-shape display payload
//!
//! A board frame is 6 rows x 22 columns of character codes in `[0, 71]`.
//! The only way to obtain a [`Grid`] is through a validating constructor, so
//! every grid held anywhere in the system is well-formed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of rows on the board
pub const GRID_ROWS: usize = 6;

/// Number of columns on the board
pub const GRID_COLS: usize = 22;

/// Largest valid character code
pub const MAX_CELL_CODE: u8 = 71;

/// Payload shape/range violation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// Wrong number of rows
    #[error("expected {GRID_ROWS} rows, found {found}")]
    RowCount { found: usize },

    /// Wrong number of columns in a row
    #[error("row {row}: expected {GRID_COLS} columns, found {found}")]
    ColumnCount { row: usize, found: usize },

    /// Cell value outside the character code range
    #[error("cell ({row}, {col}): value {value} outside [0, {MAX_CELL_CODE}]")]
    CellOutOfRange { row: usize, col: usize, value: i64 },
}

/// Validated 6x22 character-code grid
///
/// Serializes as a JSON array of 6 arrays of 22 integers, which is also the
/// wire format expected by the device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<i64>>", into = "Vec<Vec<u8>>")]
pub struct Grid([[u8; GRID_COLS]; GRID_ROWS]);

impl Grid {
    /// All-blank grid (every cell code 0)
    pub const fn blank() -> Self {
        Self([[0; GRID_COLS]; GRID_ROWS])
    }

    /// Build from a fixed-size array, checking the value range
    pub fn from_rows(rows: [[u8; GRID_COLS]; GRID_ROWS]) -> Result<Self, GridError> {
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                if value > MAX_CELL_CODE {
                    return Err(GridError::CellOutOfRange {
                        row: r,
                        col: c,
                        value: i64::from(value),
                    });
                }
            }
        }
        Ok(Self(rows))
    }

    /// Borrow the rows
    pub fn rows(&self) -> &[[u8; GRID_COLS]; GRID_ROWS] {
        &self.0
    }

    /// Character code at `(row, col)`, `None` when out of bounds
    pub fn cell(&self, row: usize, col: usize) -> Option<u8> {
        self.0.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Copy into nested vectors
    pub fn to_vec(&self) -> Vec<Vec<u8>> {
        self.0.iter().map(|row| row.to_vec()).collect()
    }

    /// Number of non-blank cells
    pub fn filled_cells(&self) -> usize {
        self.0.iter().flatten().filter(|&&v| v != 0).count()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::blank()
    }
}

impl TryFrom<Vec<Vec<i64>>> for Grid {
    type Error = GridError;

    fn try_from(rows: Vec<Vec<i64>>) -> Result<Self, Self::Error> {
        if rows.len() != GRID_ROWS {
            return Err(GridError::RowCount { found: rows.len() });
        }

        let mut cells = [[0u8; GRID_COLS]; GRID_ROWS];
        for (r, row) in rows.iter().enumerate() {
            if row.len() != GRID_COLS {
                return Err(GridError::ColumnCount {
                    row: r,
                    found: row.len(),
                });
            }
            for (c, &value) in row.iter().enumerate() {
                cells[r][c] = u8::try_from(value)
                    .ok()
                    .filter(|v| *v <= MAX_CELL_CODE)
                    .ok_or(GridError::CellOutOfRange { row: r, col: c, value })?;
            }
        }
        Ok(Self(cells))
    }
}

impl From<Grid> for Vec<Vec<u8>> {
    fn from(grid: Grid) -> Self {
        grid.to_vec()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}
