//! The right-hand side handed to the time integrator.
//!
//! One evaluation:
//!   1. Reshape the state vector into the grid (ShapeError on mismatch).
//!   2. Optionally add uniform noise to a private working copy.
//!   3. Route flow on the working copy.
//!   4. Assemble the rate field.
//!   5. Pin the boundary rows to zero.
//!   6. Report `(t, state, rate)` to the observer.
//!   7. Return the flattened rate.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error};

use crate::error::{LemError, LemResult};
use crate::flow::{route, RoutingOptions};
use crate::flux::{assemble, zero_boundary_rows, FluxParams};
use crate::grid::{ElevationGrid, GridShape};
use crate::integrate::OdeSystem;
use crate::observer::{NoopObserver, StepObserver};
use crate::params::ModelParameters;

struct Renoise {
    amplitude: f64,
    rng: StdRng,
}

pub struct DerivativeFunction<O: StepObserver = NoopObserver> {
    shape: GridShape,
    flux: FluxParams,
    routing: RoutingOptions,
    renoise: Option<Renoise>,
    observer: O,
    evaluations: u64,
}

impl DerivativeFunction<NoopObserver> {
    pub fn new(shape: GridShape, flux: FluxParams, routing: RoutingOptions) -> Self {
        Self {
            shape,
            flux,
            routing,
            renoise: None,
            observer: NoopObserver,
            evaluations: 0,
        }
    }
}

impl<O: StepObserver> DerivativeFunction<O> {
    /// Perturb every evaluation with `amplitude · U(0, 1)` noise per cell.
    /// A zero amplitude disables re-noising.
    pub fn with_renoise(mut self, amplitude: f64, seed: u64) -> Self {
        self.renoise = (amplitude > 0.0).then(|| Renoise {
            amplitude,
            rng: StdRng::seed_from_u64(seed),
        });
        self
    }

    /// Replace the observer.
    pub fn with_observer<P: StepObserver>(self, observer: P) -> DerivativeFunction<P> {
        DerivativeFunction {
            shape: self.shape,
            flux: self.flux,
            routing: self.routing,
            renoise: self.renoise,
            observer,
            evaluations: self.evaluations,
        }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn flux_params(&self) -> &FluxParams {
        &self.flux
    }

    /// Number of completed evaluations (diagnostic only).
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Evaluate `dz/dt` at `(t, state)`. `state` is never modified.
    pub fn evaluate(&mut self, t: f64, state: &[f64]) -> LemResult<Vec<f64>> {
        let mut grid = ElevationGrid::from_slice(self.shape, state)?;

        if let Some(noise) = self.renoise.as_mut() {
            for z in grid.data.iter_mut() {
                *z += noise.rng.gen::<f64>() * noise.amplitude;
            }
        }

        let flow = route(&grid, self.flux.dx, &self.routing);
        let mut rate = assemble(&grid, &flow.area, &flow.slope, &self.flux);
        zero_boundary_rows(&mut rate, self.shape);

        if let Some(i) = rate.iter().position(|r| !r.is_finite()) {
            let (row, col) = self.shape.row_col(i);
            error!(t, row, col, value = rate[i], "non-finite elevation rate");
            return Err(LemError::NumericInstability {
                t,
                detail: format!("rate[{row}][{col}] = {}", rate[i]),
            });
        }

        self.observer.on_step(t, state, &rate, self.flux.dx, self.flux.u);

        self.evaluations += 1;
        debug!(
            t,
            evaluation = self.evaluations,
            max_area = flow.area.iter().cloned().fold(0.0, f64::max),
            "derivative evaluated"
        );
        Ok(rate)
    }
}

impl<O: StepObserver> OdeSystem for DerivativeFunction<O> {
    fn rate(&mut self, t: f64, y: &[f64]) -> LemResult<Vec<f64>> {
        self.evaluate(t, y)
    }
}

/// Build the derivative function a set of parameters describes, with
/// re-noising as configured and no observer.
pub fn rebuild(params: &ModelParameters) -> DerivativeFunction {
    let config = params.config();
    let f = DerivativeFunction::new(params.shape(), params.flux_params(), config.routing);
    match config.renoise {
        Some(amplitude) => f.with_renoise(amplitude, config.seed),
        None => f,
    }
}
