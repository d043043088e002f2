//! D8 area/slope accumulation: each cell sends all of its area to the
//! steepest of its eight neighbours (diagonal distance √2·dx).
use super::{neighbour, D8_DIST, D8_OFFSETS};
use crate::grid::GridShape;

/// Steepest strictly-downslope neighbour of `(row, col)`:
/// `(index, gradient, distance in cell widths)`.
pub(crate) fn receiver(
    filled: &[f64],
    shape: GridShape,
    dx: f64,
    row: usize,
    col: usize,
) -> Option<(usize, f64, f64)> {
    let z0 = filled[shape.index(row, col)];
    let mut best: Option<(usize, f64, f64)> = None;
    for (k, &(dr, dc)) in D8_OFFSETS.iter().enumerate() {
        let ni = neighbour(shape, row, col, dr, dc);
        let drop = (z0 - filled[ni]) / (dx * D8_DIST[k]);
        if drop > best.map_or(0.0, |b| b.1) {
            best = Some((ni, drop, D8_DIST[k]));
        }
    }
    best
}

/// Accumulate area and slope over `order` (interior cells, high → low).
pub(crate) fn accumulate(
    filled: &[f64],
    shape: GridShape,
    dx: f64,
    order: &[usize],
) -> (Vec<f64>, Vec<f64>) {
    let mut area = vec![dx * dx; shape.len()];
    let mut slope = vec![0.0; shape.len()];

    for &i in order {
        let (row, col) = shape.row_col(i);
        if let Some((ni, gradient, _)) = receiver(filled, shape, dx, row, col) {
            area[ni] += area[i];
            slope[i] = gradient;
        }
    }

    (area, slope)
}

/// Longest upstream flow path ending at each cell, following D8 receivers.
/// Ridge cells and cells nothing drains into have length 0.
pub(crate) fn flow_length(filled: &[f64], shape: GridShape, dx: f64, order: &[usize]) -> Vec<f64> {
    let mut length = vec![0.0_f64; shape.len()];
    for &i in order {
        let (row, col) = shape.row_col(i);
        if let Some((ni, _, dist)) = receiver(filled, shape, dx, row, col) {
            length[ni] = length[ni].max(length[i] + dist * dx);
        }
    }
    length
}
