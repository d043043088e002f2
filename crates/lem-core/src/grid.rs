use serde::{Deserialize, Serialize};

use crate::error::{LemError, LemResult};

/// Grid dimensions. Rows are the bounded axis (rows 0 and `ny - 1` are the
/// fixed boundary rows); columns are periodic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub ny: usize,
    pub nx: usize,
}

impl GridShape {
    /// At least one interior row between the two boundary rows is required.
    pub fn new(ny: usize, nx: usize) -> LemResult<Self> {
        if ny < 3 || nx == 0 {
            return Err(LemError::config(format!(
                "grid must have ny >= 3 and nx >= 1, got {ny}x{nx}"
            )));
        }
        Ok(Self { ny, nx })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ny * self.nx
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.nx + col
    }

    #[inline]
    pub fn row_col(&self, i: usize) -> (usize, usize) {
        (i / self.nx, i % self.nx)
    }

    /// Column index with periodic wrap: `-1` maps to `nx - 1`, `nx` to `0`.
    #[inline]
    pub fn wrap_col(&self, col: isize) -> usize {
        col.rem_euclid(self.nx as isize) as usize
    }

    #[inline]
    pub fn is_boundary_row(&self, row: usize) -> bool {
        row == 0 || row == self.ny - 1
    }

    /// Fails with `LemError::Shape` unless `len` equals `ny * nx`.
    pub fn check_len(&self, what: &'static str, len: usize) -> LemResult<()> {
        if len != self.len() {
            return Err(LemError::Shape {
                what,
                expected: self.len(),
                actual: len,
            });
        }
        Ok(())
    }
}

/// A 2D elevation field in metres, row-major, `ny` rows by `nx` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationGrid {
    /// Row-major elevation values.
    pub data: Vec<f64>,
    pub ny: usize,
    pub nx: usize,
}

impl ElevationGrid {
    /// Create a grid filled with the given value.
    pub fn new(shape: GridShape, fill: f64) -> Self {
        Self {
            data: vec![fill; shape.len()],
            ny: shape.ny,
            nx: shape.nx,
        }
    }

    /// Create a flat (zero-elevation) grid.
    pub fn flat(shape: GridShape) -> Self {
        Self::new(shape, 0.0)
    }

    /// Reshape a flat row-major vector. Pure move, no copying of values.
    pub fn from_flat(shape: GridShape, data: Vec<f64>) -> LemResult<Self> {
        shape.check_len("state vector", data.len())?;
        Ok(Self {
            data,
            ny: shape.ny,
            nx: shape.nx,
        })
    }

    pub fn from_slice(shape: GridShape, data: &[f64]) -> LemResult<Self> {
        shape.check_len("state vector", data.len())?;
        Ok(Self {
            data: data.to_vec(),
            ny: shape.ny,
            nx: shape.nx,
        })
    }

    #[inline]
    pub fn shape(&self) -> GridShape {
        GridShape { ny: self.ny, nx: self.nx }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.nx + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: f64) {
        self.data[row * self.nx + col] = val;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.nx..(row + 1) * self.nx]
    }

    /// Flatten back to the row-major state vector.
    pub fn into_flat(self) -> Vec<f64> {
        self.data
    }

    /// Checks that a deserialized grid is internally consistent and matches
    /// `expected`.
    pub fn check_shape(&self, what: &'static str, expected: GridShape) -> LemResult<()> {
        if self.data.len() != self.ny * self.nx {
            return Err(LemError::Shape {
                what,
                expected: self.ny * self.nx,
                actual: self.data.len(),
            });
        }
        if self.shape() != expected {
            return Err(LemError::Dimensions {
                what,
                expected_ny: expected.ny,
                expected_nx: expected.nx,
                ny: self.ny,
                nx: self.nx,
            });
        }
        Ok(())
    }

    pub fn min_elevation(&self) -> f64 {
        self.data.iter().cloned().fold(f64::INFINITY, f64::min)
    }

    pub fn max_elevation(&self) -> f64 {
        self.data.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }
}
