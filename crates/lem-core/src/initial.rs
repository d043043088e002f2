//! Initial elevation fields: a tent-shaped ridge between the two boundary
//! rows with optional uniform noise, plus externally supplied perturbations.
use std::path::Path;

use rand::Rng;

use crate::error::LemResult;
use crate::grid::{ElevationGrid, GridShape};
use crate::store::read_json;

/// `z = noise_level · u − drop · |row − ny/2| + ny · drop / 2` with
/// `u ~ U(0, 1)` per cell, and both boundary rows set to zero.
///
/// `drop` is the elevation lost per row away from the ridge line, i.e. the
/// regional gradient times `dx`.
pub fn randomized_grid<R: Rng>(
    shape: GridShape,
    noise_level: f64,
    drop: f64,
    rng: &mut R,
) -> ElevationGrid {
    let mut grid = ElevationGrid::flat(shape);
    let mid = 0.5 * shape.ny as f64;
    let crest = shape.ny as f64 * drop / 2.0;
    for row in 0..shape.ny {
        let base = crest - drop * (row as f64 - mid).abs();
        for col in 0..shape.nx {
            let noise = rng.gen::<f64>() * noise_level;
            grid.set(row, col, noise + base);
        }
    }
    for col in 0..shape.nx {
        grid.set(0, col, 0.0);
        grid.set(shape.ny - 1, col, 0.0);
    }
    grid
}

/// Add `perturbation` cell by cell. The perturbation must have exactly the
/// grid's shape.
pub fn apply_perturbation(grid: &mut ElevationGrid, perturbation: &ElevationGrid) -> LemResult<()> {
    perturbation.check_shape("perturbation grid", grid.shape())?;
    for (z, dz) in grid.data.iter_mut().zip(&perturbation.data) {
        *z += dz;
    }
    Ok(())
}

/// Read a perturbation grid stored as JSON `{ "data": [...], "ny": .., "nx": .. }`.
pub fn load_perturbation(path: &Path, expected: GridShape) -> LemResult<ElevationGrid> {
    let grid: ElevationGrid = read_json(path)?;
    grid.check_shape("perturbation grid", expected)?;
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LemError;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn noiseless_grid_is_a_tent() {
        let shape = GridShape::new(6, 3).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let g = randomized_grid(shape, 0.0, 2.0, &mut rng);
        // crest = 6, |row - 3| = 3, 2, 1, 0, 1, 2
        let expected = [0.0, 2.0, 4.0, 6.0, 4.0, 0.0];
        for (row, want) in expected.iter().enumerate() {
            for col in 0..3 {
                assert_relative_eq!(g.get(row, col), *want);
            }
        }
    }

    #[test]
    fn noise_is_bounded_and_seeded() {
        let shape = GridShape::new(8, 5).unwrap();
        let a = randomized_grid(shape, 0.25, 0.0, &mut StdRng::seed_from_u64(9));
        let b = randomized_grid(shape, 0.25, 0.0, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
        for row in 1..7 {
            for col in 0..5 {
                let z = a.get(row, col);
                assert!((0.0..0.25).contains(&z), "{z}");
            }
        }
    }

    #[test]
    fn perturbation_adds_cellwise() {
        let shape = GridShape::new(3, 2).unwrap();
        let mut g = ElevationGrid::new(shape, 1.0);
        let p = ElevationGrid::from_flat(shape, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        apply_perturbation(&mut g, &p).unwrap();
        assert_eq!(g.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn mismatched_perturbation_is_a_shape_error() {
        let mut g = ElevationGrid::flat(GridShape::new(3, 2).unwrap());
        let p = ElevationGrid::flat(GridShape::new(3, 3).unwrap());
        assert!(matches!(apply_perturbation(&mut g, &p), Err(LemError::Dimensions { .. })));
        assert_eq!(g.data, vec![0.0; 6]);
    }

    #[test]
    fn perturbation_file_is_checked_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("random_grid.json");
        let p = ElevationGrid::new(GridShape::new(4, 2).unwrap(), 0.5);
        crate::store::write_json_atomic(&path, &p).unwrap();

        let loaded = load_perturbation(&path, GridShape::new(4, 2).unwrap()).unwrap();
        assert_eq!(loaded, p);
        let err = load_perturbation(&path, GridShape::new(8, 1).unwrap()).unwrap_err();
        assert!(matches!(err, LemError::Dimensions { .. }));
    }
}
