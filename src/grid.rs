//! Sample shapes and row-major time × bin grids
//!
//! Profiling instruments record one row per timestamp and one column per bin.
//! Bin index increases away from the instrument.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Shape of a sample series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    /// 1-D series of `n` samples
    Series(usize),
    /// 2-D series of `times` rows by `bins` columns
    Profile {
        /// Number of timestamps (rows)
        times: usize,
        /// Number of bins per timestamp (columns)
        bins: usize,
    },
}

impl Shape {
    /// Total number of samples.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Self::Series(n) => n,
            Self::Profile { times, bins } => times * bins,
        }
    }

    /// Whether the shape holds no samples.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// Number of rows (timestamps).
    #[must_use]
    pub const fn rows(self) -> usize {
        match self {
            Self::Series(n) => n,
            Self::Profile { times, .. } => times,
        }
    }

    /// Number of columns; 1 for a 1-D series.
    #[must_use]
    pub const fn cols(self) -> usize {
        match self {
            Self::Series(_) => 1,
            Self::Profile { bins, .. } => bins,
        }
    }
}

/// Row-major 2-D grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T: Clone> Grid<T> {
    /// Grid of `rows × cols` filled with `value`.
    #[must_use]
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            rows,
            cols,
            cells: vec![value; rows * cols],
        }
    }

    /// Wrap row-major `cells`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when `cells.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, cells: Vec<T>) -> Result<Self> {
        if cells.len() != rows * cols {
            return Err(Error::ShapeMismatch {
                expected: rows * cols,
                actual: cells.len(),
            });
        }
        Ok(Self { rows, cols, cells })
    }

    /// Build from nested rows.
    ///
    /// # Errors
    /// Returns error if rows are ragged.
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut cells = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(Error::ShapeMismatch {
                    expected: cols,
                    actual: row.len(),
                });
            }
            cells.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            cells,
        })
    }

    /// Grid over a slice viewed with `shape`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when `cells.len() != shape.len()`.
    pub fn with_shape(shape: Shape, cells: &[T]) -> Result<Self> {
        Self::from_vec(shape.rows(), shape.cols(), cells.to_vec())
    }

    /// Cell at (`row`, `col`).
    ///
    /// # Panics
    /// Panics when out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> &T {
        &self.cells[row * self.cols + col]
    }

    /// Overwrite cell at (`row`, `col`).
    ///
    /// # Panics
    /// Panics when out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.cells[row * self.cols + col] = value;
    }

    /// One row as a slice.
    #[must_use]
    pub fn row(&self, row: usize) -> &[T] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    /// One row as a mutable slice.
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        let cols = self.cols;
        &mut self.cells[row * cols..(row + 1) * cols]
    }

    /// Iterate rows.
    pub fn rows_iter(&self) -> impl Iterator<Item = &[T]> {
        // chunks(0) panics, so empty-column grids yield no rows
        self.cells.chunks(self.cols.max(1)).take(self.rows)
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Grid shape as a [`Shape::Profile`].
    #[must_use]
    pub const fn shape(&self) -> Shape {
        Shape::Profile {
            times: self.rows,
            bins: self.cols,
        }
    }

    /// Row-major cells.
    #[must_use]
    pub fn cells(&self) -> &[T] {
        &self.cells
    }

    /// Consume into row-major cells.
    #[must_use]
    pub fn into_cells(self) -> Vec<T> {
        self.cells
    }

    /// Whether `other` has the same dimensions.
    #[must_use]
    pub fn same_dims<U>(&self, other: &Grid<U>) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    /// Apply `f` to every cell.
    #[must_use]
    pub fn map<U: Clone>(&self, f: impl Fn(&T) -> U) -> Grid<U> {
        Grid {
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.iter().map(f).collect(),
        }
    }
}

/// Clamp `range` to `0..len`, returning `None` when nothing remains.
#[must_use]
pub fn clamp_range(range: &Range<usize>, len: usize) -> Option<Range<usize>> {
    let start = range.start.min(len);
    let end = range.end.min(len);
    (start < end).then_some(start..end)
}
