//! Priority-Flood depression filling (Barnes, Lehman & Mulla, 2014).
//!
//! Both boundary rows seed the queue as outlets; the column axis wraps.
//! Cells are visited lowest-first and each newly reached cell is raised to
//! the level of the cell that reached it when it sits below that level.
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use super::{neighbour, D8_OFFSETS};
use crate::grid::GridShape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// Raise pits exactly to the spill level, leaving flat floors.
    #[default]
    Flat,
    /// Priority-Flood+ε: raise pits to the next representable value above the
    /// spill level so every filled cell keeps a strictly lower neighbour.
    Epsilon,
}

#[derive(Debug, Clone, Copy)]
struct FloodCell {
    z: f64,
    idx: usize,
}

impl PartialEq for FloodCell {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FloodCell {}

impl PartialOrd for FloodCell {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloodCell {
    // Reversed so the max-heap pops the lowest cell, lowest index on ties.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .z
            .total_cmp(&self.z)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Return the filled copy of `elevation` (row-major, `shape`).
pub fn priority_flood(elevation: &[f64], shape: GridShape, mode: FillMode) -> Vec<f64> {
    let n = shape.len();
    let mut filled = elevation.to_vec();
    let mut closed = vec![false; n];
    let mut open = BinaryHeap::with_capacity(2 * shape.nx);

    for row in [0, shape.ny - 1] {
        for col in 0..shape.nx {
            let i = shape.index(row, col);
            closed[i] = true;
            open.push(FloodCell { z: elevation[i], idx: i });
        }
    }

    while let Some(cell) = open.pop() {
        let (row, col) = shape.row_col(cell.idx);
        for &(dr, dc) in D8_OFFSETS.iter() {
            let nr = row as isize + dr;
            if nr < 0 || nr >= shape.ny as isize {
                continue;
            }
            let ni = neighbour(shape, row, col, dr, dc);
            if closed[ni] {
                continue;
            }
            closed[ni] = true;

            let z = match mode {
                FillMode::Flat => elevation[ni].max(cell.z),
                FillMode::Epsilon => {
                    let floor = next_up(cell.z);
                    if elevation[ni] <= floor {
                        floor
                    } else {
                        elevation[ni]
                    }
                }
            };
            filled[ni] = z;
            open.push(FloodCell { z, idx: ni });
        }
    }

    filled
}

/// Smallest `f64` strictly greater than `x`.
fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}
