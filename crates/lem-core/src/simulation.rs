//! Run driver: builds the model from a [`RunConfig`], integrates it over the
//! configured schedule, and resumes from a checkpoint.
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::RunConfig;
use crate::derivative::{rebuild, DerivativeFunction};
use crate::error::{LemError, LemResult};
use crate::grid::ElevationGrid;
use crate::initial::{apply_perturbation, load_perturbation, randomized_grid};
use crate::integrate::{integrate, IntegrationResult};
use crate::observer::{ObserverState, SteppingObserver};
use crate::params::ModelParameters;
use crate::store::RunStore;

/// What a finished run leaves behind.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub result: IntegrationResult,
    pub observer: ObserverState,
    pub evaluations: u64,
    pub results_path: PathBuf,
}

pub struct Simulation {
    config: RunConfig,
    params: ModelParameters,
    store: RunStore,
    derivative: DerivativeFunction<SteppingObserver>,
    t0: f64,
    y0: Vec<f64>,
    t_eval: Vec<f64>,
}

impl Simulation {
    /// Fresh run from the generated initial surface, plus the configured
    /// perturbation grid if any.
    pub fn from_config(config: RunConfig) -> LemResult<Self> {
        config.validate()?;
        let shape = config.shape()?;
        let init = &config.initial;
        let mut rng = StdRng::seed_from_u64(init.seed);
        let mut grid = randomized_grid(shape, init.noise_level, init.slope * config.dx, &mut rng);
        if let Some(path) = &init.perturbation {
            let perturbation = load_perturbation(path, shape)?;
            apply_perturbation(&mut grid, &perturbation)?;
        }
        Self::from_initial(config, grid)
    }

    /// Fresh run from an explicit initial surface.
    pub fn from_initial(config: RunConfig, initial: ElevationGrid) -> LemResult<Self> {
        config.validate()?;
        let params = ModelParameters::new(config.model_config()?)?;
        initial.check_shape("initial grid", params.shape())?;

        let store = config.store();
        let observer = SteppingObserver::new(store.clone(), params.config().clone(), config.observer);
        let derivative = rebuild(&params).with_observer(observer);
        let t_eval = config
            .integration
            .schedule
            .times(params.config().stream_power.time_to_steady_state);

        Ok(Self {
            config,
            params,
            store,
            derivative,
            t0: 0.0,
            y0: initial.into_flat(),
            t_eval,
        })
    }

    /// Resume from `<output_dir>/<run_name>_checkpoint.p`.
    ///
    /// The model (grid, physics, routing, re-noising) comes from the
    /// checkpoint; observer cadence and integration settings come from
    /// `config`.
    pub fn restart(config: RunConfig) -> LemResult<Self> {
        config.validate()?;
        let store = config.store();
        let record = store.load_checkpoint()?;
        info!(
            t = record.t,
            path = %store.checkpoint_path().display(),
            "restarting from checkpoint"
        );

        let params = ModelParameters::new(record.model.clone())?;
        let observer = SteppingObserver::resume(
            store.clone(),
            record.model,
            config.observer,
            record.observer,
        );
        let derivative = rebuild(&params).with_observer(observer);
        let t_eval = config
            .integration
            .schedule
            .times_after(params.config().stream_power.time_to_steady_state, record.t);

        Ok(Self {
            config,
            params,
            store,
            derivative,
            t0: record.t,
            y0: record.state,
            t_eval,
        })
    }

    pub fn params(&self) -> &ModelParameters {
        &self.params
    }

    pub fn start_time(&self) -> f64 {
        self.t0
    }

    pub fn end_time(&self) -> f64 {
        self.config
            .integration
            .schedule
            .end_time(self.params.config().stream_power.time_to_steady_state)
    }

    pub fn eval_times(&self) -> &[f64] {
        &self.t_eval
    }

    pub fn initial_state(&self) -> &[f64] {
        &self.y0
    }

    /// Integrate to the end time and write `<run_name>_results.p`. Failing to
    /// write the results file fails the run.
    pub fn run(self) -> LemResult<RunSummary> {
        let t_end = self.end_time();
        if self.t0 >= t_end {
            return Err(LemError::config(format!(
                "start time {} is not before end time {t_end}",
                self.t0
            )));
        }
        let Simulation { config, store, mut derivative, t0, y0, t_eval, .. } = self;

        info!(
            run = store.run_name(),
            t0,
            t_end,
            outputs = t_eval.len(),
            cells = y0.len(),
            "starting integration"
        );
        let result = integrate(&mut derivative, y0, (t0, t_end), &t_eval, &config.integration.options)?;
        let results_path = store.write_results(&result)?;
        info!(
            nfev = result.nfev,
            accepted = result.n_accepted,
            rejected = result.n_rejected,
            path = %results_path.display(),
            "run complete"
        );

        let evaluations = derivative.evaluations();
        Ok(RunSummary {
            result,
            observer: derivative.into_observer().state().clone(),
            evaluations,
            results_path,
        })
    }
}
