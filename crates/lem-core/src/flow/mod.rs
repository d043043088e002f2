//! Flow routing: depression filling → processing order → area/slope
//! accumulation. Recomputed from scratch on every derivative evaluation.
pub mod d8;
pub mod dinf;
pub mod fill;

use serde::{Deserialize, Serialize};

use crate::grid::{ElevationGrid, GridShape};
pub use fill::FillMode;

/// Neighbour offsets `(d_row, d_col)`, clockwise from east.
pub(crate) const D8_OFFSETS: [(isize, isize); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

/// Distance to each `D8_OFFSETS` neighbour in cell widths.
pub(crate) const D8_DIST: [f64; 8] = [
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
    1.0,
    std::f64::consts::SQRT_2,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingScheme {
    /// All flow to the single steepest neighbour.
    D8,
    /// Tarboton (1997) facet routing, flow split between two neighbours.
    #[default]
    DInfinity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingOptions {
    #[serde(default)]
    pub scheme: RoutingScheme,
    #[serde(default)]
    pub fill: FillMode,
}

/// Drainage area and slope for one elevation field.
#[derive(Debug, Clone)]
pub struct FlowField {
    /// Upslope contributing area (m²), always ≥ `dx²`.
    pub area: Vec<f64>,
    /// Steepest downslope gradient on the filled surface, ≥ 0.
    pub slope: Vec<f64>,
    /// The depression-filled surface the routing ran on.
    pub filled: Vec<f64>,
    pub ny: usize,
    pub nx: usize,
}

/// Fill depressions, then accumulate area and slope with the chosen scheme.
pub fn route(grid: &ElevationGrid, dx: f64, options: &RoutingOptions) -> FlowField {
    let shape = grid.shape();
    let filled = fill::priority_flood(&grid.data, shape, options.fill);
    let order = processing_order(&filled, shape);

    let (area, slope) = match options.scheme {
        RoutingScheme::D8 => d8::accumulate(&filled, shape, dx, &order),
        RoutingScheme::DInfinity => dinf::accumulate(&filled, shape, dx, &order),
    };

    FlowField {
        area,
        slope,
        filled,
        ny: shape.ny,
        nx: shape.nx,
    }
}

/// Return the depression-filled copy of `grid`.
pub fn fill_depressions(grid: &ElevationGrid, mode: FillMode) -> ElevationGrid {
    ElevationGrid {
        data: fill::priority_flood(&grid.data, grid.shape(), mode),
        ny: grid.ny,
        nx: grid.nx,
    }
}

/// Longest upstream flow-path length (m) ending at each cell, measured on
/// the filled surface along steepest-descent receivers.
pub fn length(grid: &ElevationGrid, dx: f64, fill: FillMode) -> Vec<f64> {
    let shape = grid.shape();
    let filled = fill::priority_flood(&grid.data, shape, fill);
    let order = processing_order(&filled, shape);
    d8::flow_length(&filled, shape, dx, &order)
}

/// Interior cells sorted high → low by filled elevation; ties go to the lower
/// row-major index first. Boundary rows are terminal and never distribute.
pub(crate) fn processing_order(filled: &[f64], shape: GridShape) -> Vec<usize> {
    let mut order: Vec<usize> = (shape.nx..shape.len() - shape.nx).collect();
    order.sort_by(|&a, &b| filled[b].total_cmp(&filled[a]).then(a.cmp(&b)));
    order
}

/// Index of the neighbour at `(d_row, d_col)` from `(row, col)`. Caller
/// guarantees the row stays in range; the column wraps.
#[inline]
pub(crate) fn neighbour(shape: GridShape, row: usize, col: usize, d_row: isize, d_col: isize) -> usize {
    let nr = (row as isize + d_row) as usize;
    shape.index(nr, shape.wrap_col(col as isize + d_col))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Uniform tilt toward row 0: every interior cell drains straight north.
    fn make_plane(ny: usize, nx: usize, dx: f64) -> ElevationGrid {
        let shape = GridShape::new(ny, nx).unwrap();
        let mut grid = ElevationGrid::flat(shape);
        for r in 0..ny {
            for c in 0..nx {
                grid.set(r, c, r as f64 * 0.5 * dx);
            }
        }
        grid
    }

    #[test]
    fn plane_area_counts_upslope_cells_exactly() {
        let (ny, nx, dx) = (8, 5, 10.0);
        let grid = make_plane(ny, nx, dx);
        for scheme in [RoutingScheme::D8, RoutingScheme::DInfinity] {
            let opts = RoutingOptions { scheme, fill: FillMode::Flat };
            let flow = route(&grid, dx, &opts);
            for r in 1..ny - 1 {
                for c in 0..nx {
                    // Row r collects itself plus rows r+1 ..= ny-2.
                    let k = (ny - 1 - r) as f64;
                    assert_eq!(flow.area[r * nx + c], k * dx * dx, "{scheme:?} row {r} col {c}");
                    assert!((flow.slope[r * nx + c] - 0.5).abs() < 1e-12);
                }
            }
            // Outlet row receives the whole column; the top row is terminal.
            assert_eq!(flow.area[2], (ny - 1) as f64 * dx * dx);
            assert_eq!(flow.area[(ny - 1) * nx], dx * dx);
            assert_eq!(flow.slope[(ny - 1) * nx], 0.0);
        }
    }

    #[test]
    fn area_never_decreases_downslope() {
        let (ny, nx, dx) = (12, 6, 1.0);
        let grid = make_plane(ny, nx, dx);
        let flow = route(&grid, dx, &RoutingOptions::default());
        for c in 0..nx {
            for r in 1..ny - 1 {
                assert!(flow.area[(r - 1) * nx + c] >= flow.area[r * nx + c]);
            }
        }
    }

    #[test]
    fn area_and_slope_bounds_hold_on_rough_surface() {
        let shape = GridShape::new(9, 7).unwrap();
        let mut grid = ElevationGrid::flat(shape);
        for r in 1..8 {
            for c in 0..7 {
                let v = ((r * 31 + c * 17) % 11) as f64 * 0.7 + (4 - (r as isize - 4).abs()) as f64;
                grid.set(r, c, v);
            }
        }
        let dx = 3.0;
        for fill in [FillMode::Flat, FillMode::Epsilon] {
            let opts = RoutingOptions { scheme: RoutingScheme::DInfinity, fill };
            let flow = route(&grid, dx, &opts);
            assert!(flow.area.iter().all(|&a| a >= dx * dx));
            assert!(flow.slope.iter().all(|&s| s >= 0.0 && s.is_finite()));
            // Every interior cell drains somewhere, so outlets collect it all.
            let outlet: f64 = (0..7).map(|c| flow.area[c] + flow.area[8 * 7 + c]).sum();
            if fill == FillMode::Epsilon {
                let total = shape.len() as f64 * dx * dx;
                assert!((outlet - total).abs() < 1e-6 * total, "outlet {outlet} total {total}");
            }
        }
    }

    #[test]
    fn routing_is_deterministic() {
        let grid = make_plane(6, 4, 1.0);
        let a = route(&grid, 1.0, &RoutingOptions::default());
        let b = route(&grid, 1.0, &RoutingOptions::default());
        assert_eq!(a.area, b.area);
        assert_eq!(a.slope, b.slope);
    }

    #[test]
    fn processing_order_breaks_ties_by_index() {
        let shape = GridShape::new(3, 4).unwrap();
        let filled = vec![0.0, 0.0, 0.0, 0.0, 2.0, 1.0, 2.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(processing_order(&filled, shape), vec![4, 6, 5, 7]);
    }

    #[test]
    fn plane_flow_length_grows_toward_the_outlet() {
        let (ny, nx, dx) = (8, 5, 10.0);
        let grid = make_plane(ny, nx, dx);
        for fill in [FillMode::Flat, FillMode::Epsilon] {
            let len = length(&grid, dx, fill);
            for r in 0..ny - 1 {
                for c in 0..nx {
                    // Paths start at row ny-2 and run straight north.
                    let steps = (ny - 2 - r) as f64;
                    assert_eq!(len[r * nx + c], steps * dx, "row {r} col {c}");
                }
            }
            assert!(len[(ny - 1) * nx..].iter().all(|&l| l == 0.0));
        }
    }
}
