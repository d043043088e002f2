//! D-infinity area/slope accumulation (Tarboton, 1997).
//!
//! Each cell is split into eight triangular facets, each bounded by one
//! cardinal and one diagonal neighbour. On facet k:
//!
//! ```text
//!   s1 = (z0 − z1) / dx          z1 = cardinal neighbour
//!   s2 = (z1 − z2) / dx          z2 = diagonal neighbour
//!   r  = atan2(s2, s1)
//! ```
//!
//! `r` is clamped to `[0, π/4]`; at `r < 0` the slope is `s1`, at `r > π/4` it
//! is the diagonal drop `(z0 − z2) / (√2·dx)`, otherwise `√(s1² + s2²)`.
//! The steepest facet wins and the cell's area is split by angle:
//! `(1 − r/(π/4))` to the cardinal neighbour and `r/(π/4)` to the diagonal.
use std::f64::consts::{FRAC_PI_4, SQRT_2};

use super::neighbour;
use crate::grid::GridShape;

/// `(cardinal, diagonal)` offsets per facet, anticlockwise from east
/// (row −1 is "north").
const FACETS: [((isize, isize), (isize, isize)); 8] = [
    ((0, 1), (-1, 1)),
    ((-1, 0), (-1, 1)),
    ((-1, 0), (-1, -1)),
    ((0, -1), (-1, -1)),
    ((0, -1), (1, -1)),
    ((1, 0), (1, -1)),
    ((1, 0), (1, 1)),
    ((0, 1), (1, 1)),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FacetFlow {
    pub slope: f64,
    pub cardinal: usize,
    pub diagonal: usize,
    /// Fraction of flow along the diagonal edge, in `[0, 1]`.
    pub diagonal_share: f64,
}

/// Steepest strictly-downslope facet at interior cell `(row, col)`, or `None`
/// when no facet descends.
pub(crate) fn steepest_facet(
    filled: &[f64],
    shape: GridShape,
    dx: f64,
    row: usize,
    col: usize,
) -> Option<FacetFlow> {
    let z0 = filled[shape.index(row, col)];
    let mut best: Option<FacetFlow> = None;

    for &((cr, cc), (dr, dc)) in FACETS.iter() {
        let i1 = neighbour(shape, row, col, cr, cc);
        let i2 = neighbour(shape, row, col, dr, dc);
        let s1 = (z0 - filled[i1]) / dx;
        let s2 = (filled[i1] - filled[i2]) / dx;

        let mut r = s2.atan2(s1);
        let slope = if r < 0.0 {
            r = 0.0;
            s1
        } else if r > FRAC_PI_4 {
            r = FRAC_PI_4;
            (z0 - filled[i2]) / (SQRT_2 * dx)
        } else {
            s1.hypot(s2)
        };

        if slope > best.map_or(0.0, |b| b.slope) {
            best = Some(FacetFlow {
                slope,
                cardinal: i1,
                diagonal: i2,
                diagonal_share: r / FRAC_PI_4,
            });
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
        if let Some(flow) = steepest_facet(filled, shape, dx, row, col) {
            let a = area[i];
            area[flow.cardinal] += a * (1.0 - flow.diagonal_share);
            area[flow.diagonal] += a * flow.diagonal_share;
            slope[i] = flow.slope;
        }
    }

    (area, slope)
}
