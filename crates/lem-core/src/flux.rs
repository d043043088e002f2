//! Elevation-rate assembly: uplift + hillslope diffusion + stream-power
//! incision.
//!
//! ```text
//!   dz/dt = U − ∂Qx/∂x − ∂Qy/∂y − K · A^m · S
//!   Qx = −D ∂z/∂x   (periodic in columns)
//!   Qy = −D ∂z/∂y   (rows bounded; outer faces carry ∓U·dx)
//! ```
use serde::{Deserialize, Serialize};

use crate::grid::{ElevationGrid, GridShape};

/// Physical coefficients the rate assembly needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FluxParams {
    /// Grid spacing (m).
    pub dx: f64,
    /// Erosion coefficient.
    pub k: f64,
    /// Uplift rate.
    pub u: f64,
    /// Hillslope diffusivity.
    pub d: f64,
    /// Drainage-area exponent.
    pub m: f64,
}

/// Compute the elevation-rate field for `grid` given per-cell `area` and
/// `slope`. Rows 0 and `ny − 1` of the result are exactly zero.
pub fn assemble(grid: &ElevationGrid, area: &[f64], slope: &[f64], p: &FluxParams) -> Vec<f64> {
    let shape = grid.shape();
    let mut rate = vec![0.0; shape.len()];

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        rate.par_chunks_mut(shape.nx)
            .enumerate()
            .for_each(|(row, out)| assemble_row(grid, area, slope, p, row, out));
    }
    #[cfg(not(feature = "threading"))]
    {
        for (row, out) in rate.chunks_mut(shape.nx).enumerate() {
            assemble_row(grid, area, slope, p, row, out);
        }
    }

    zero_boundary_rows(&mut rate, shape);
    rate
}

/// Pin the two fixed-elevation rows to a zero rate.
pub fn zero_boundary_rows(rate: &mut [f64], shape: GridShape) {
    let nx = shape.nx;
    rate[..nx].fill(0.0);
    rate[(shape.ny - 1) * nx..].fill(0.0);
}

fn assemble_row(
    grid: &ElevationGrid,
    area: &[f64],
    slope: &[f64],
    p: &FluxParams,
    row: usize,
    out: &mut [f64],
) {
    let shape = grid.shape();
    for (col, cell) in out.iter_mut().enumerate() {
        let i = shape.index(row, col);
        let z = grid.get(row, col);
        let west = grid.get(row, shape.wrap_col(col as isize - 1));
        let east = grid.get(row, shape.wrap_col(col as isize + 1));

        let qx_west = -p.d * (z - west) / p.dx;
        let qx_east = -p.d * (east - z) / p.dx;
        let qy_north = face_flux_y(grid, row, col, p);
        let qy_south = face_flux_y(grid, row + 1, col, p);

        let diffusion = -(qx_east - qx_west) / p.dx - (qy_south - qy_north) / p.dx;
        let erosion = -p.k * area[i].powf(p.m) * slope[i];
        *cell = p.u + diffusion + erosion;
    }
}

/// Row-direction flux through face `face` (between rows `face − 1` and
/// `face`). The outer faces 0 and `ny` offset the adjacent interior flux by
/// the uplift carried across the boundary.
fn face_flux_y(grid: &ElevationGrid, face: usize, col: usize, p: &FluxParams) -> f64 {
    let ny = grid.ny;
    let inner = |k: usize| -p.d * (grid.get(k + 1, col) - grid.get(k, col)) / p.dx;
    if face == 0 {
        inner(0) - p.u * p.dx
    } else if face == ny {
        inner(ny - 2) + p.u * p.dx
    } else {
        inner(face - 1)
    }
}
