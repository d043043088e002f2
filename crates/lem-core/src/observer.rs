//! Step observers: hooks invoked with every evaluated `(t, state, rate)`.
//!
//! `SteppingObserver` tracks the flux fraction `1 − mean(rate / U)` and
//! drives two independent cadences:
//! - each time the flux fraction passes the next multiple of
//!   `output_every`, a labelled snapshot is written;
//! - every `checkpoint_every + 1` evaluations, a checkpoint is written.
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::params::ModelConfig;
use crate::store::{CheckpointRecord, OutputSnapshot, RunStore};

/// Receives every evaluated state. Implementations may do I/O but cannot
/// change what the derivative returns.
pub trait StepObserver {
    fn on_step(&mut self, t: f64, state: &[f64], rate: &[f64], dx: f64, u: f64);
}

/// Observer that ignores every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn on_step(&mut self, _t: f64, _state: &[f64], _rate: &[f64], _dx: f64, _u: f64) {}
}

/// `1 − mean(rate / U)`: 0 when the whole field rises at the uplift rate,
/// 1 when erosion balances uplift everywhere. `None` when `U` is negligible
/// next to the largest rate magnitude, or the result is not finite.
pub fn flux_fraction(rate: &[f64], u: f64) -> Option<f64> {
    if rate.is_empty() || !u.is_finite() || u == 0.0 {
        return None;
    }
    let max_rate = rate.iter().fold(0.0f64, |m, r| m.max(r.abs()));
    if u.abs() <= f64::EPSILON * max_rate {
        return None;
    }
    let mean = rate.iter().map(|&r| r / u).sum::<f64>() / rate.len() as f64;
    let fraction = 1.0 - mean;
    fraction.is_finite().then_some(fraction)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverSettings {
    /// Evaluations between checkpoints.
    pub checkpoint_every: u64,
    /// Flux-fraction spacing between output snapshots.
    pub output_every: f64,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self { checkpoint_every: 10, output_every: 0.1 }
    }
}

/// The persisted part of a `SteppingObserver`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserverState {
    pub model_times: Vec<f64>,
    pub flux: Vec<f64>,
    /// Evaluations since the last checkpoint.
    pub counter: u64,
    /// Flux fraction of the last snapshot written.
    pub last_flux_output: f64,
}

pub struct SteppingObserver {
    store: RunStore,
    model: ModelConfig,
    settings: ObserverSettings,
    state: ObserverState,
}

impl SteppingObserver {
    pub fn new(store: RunStore, model: ModelConfig, settings: ObserverSettings) -> Self {
        Self::resume(store, model, settings, ObserverState::default())
    }

    /// Continue from a checkpointed observer state.
    pub fn resume(
        store: RunStore,
        model: ModelConfig,
        settings: ObserverSettings,
        state: ObserverState,
    ) -> Self {
        Self { store, model, settings, state }
    }

    pub fn state(&self) -> &ObserverState {
        &self.state
    }

    pub fn settings(&self) -> ObserverSettings {
        self.settings
    }

    fn output_model(&mut self, t: f64, state: &[f64]) {
        let label = self.state.last_flux_output + self.settings.output_every;
        let snapshot = OutputSnapshot { t, state: state.to_vec() };
        match self.store.write_output(label, &snapshot) {
            Ok(path) => info!(t, flux = label, path = %path.display(), "output snapshot written"),
            Err(e) => warn!(t, flux = label, error = %e, "skipping output snapshot"),
        }
        self.state.last_flux_output = label;
    }

    fn checkpoint_model(&self, t: f64, state: &[f64]) {
        let record = CheckpointRecord {
            t,
            state: state.to_vec(),
            model: self.model.clone(),
            observer: self.state.clone(),
        };
        match self.store.write_checkpoint(&record) {
            Ok(path) => info!(t, path = %path.display(), "checkpoint written"),
            Err(e) => warn!(t, error = %e, "checkpoint failed; previous checkpoint kept"),
        }
    }
}

impl StepObserver for SteppingObserver {
    fn on_step(&mut self, t: f64, state: &[f64], rate: &[f64], _dx: f64, u: f64) {
        match flux_fraction(rate, u) {
            Some(fraction) => {
                self.state.model_times.push(t);
                self.state.flux.push(fraction);
                if fraction >= self.state.last_flux_output + self.settings.output_every {
                    self.output_model(t, state);
                }
            }
            None => warn!(t, u, "flux fraction undefined (uplift near zero or non-finite rate)"),
        }

        self.state.counter += 1;
        if self.state.counter > self.settings.checkpoint_every {
            self.state.counter = 0;
            self.checkpoint_model(t, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::RoutingOptions;
    use crate::grid::GridShape;
    use crate::params::StreamPowerParams;

    #[test]
    fn uniform_uplift_rate_gives_zero_fraction() {
        let u = 3.7e-4;
        assert_eq!(flux_fraction(&[u; 12], u), Some(0.0));
    }

    #[test]
    fn zero_rate_gives_unit_fraction() {
        assert_eq!(flux_fraction(&[0.0; 12], 1e-3), Some(1.0));
    }

    #[test]
    fn tiny_uplift_in_matching_units_is_not_guarded() {
        assert_eq!(flux_fraction(&[1e-20; 4], 1e-20), Some(0.0));
        assert_eq!(flux_fraction(&[0.0; 4], 1e-20), Some(1.0));
    }

    #[test]
    fn near_zero_uplift_is_guarded() {
        assert_eq!(flux_fraction(&[1.0, 2.0], 0.0), None);
        assert_eq!(flux_fraction(&[1.0, 2.0], 1e-300), None);
        assert_eq!(flux_fraction(&[f64::NAN], 1.0), None);
    }

    fn model() -> ModelConfig {
        ModelConfig {
            shape: GridShape { ny: 3, nx: 2 },
            dx: 1.0,
            stream_power: StreamPowerParams::default(),
            routing: RoutingOptions::default(),
            renoise: None,
            seed: 0,
        }
    }

    #[test]
    fn snapshot_written_once_per_threshold_and_checkpoint_on_cadence() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "obs");
        let settings = ObserverSettings { checkpoint_every: 2, output_every: 0.1 };
        let mut obs = SteppingObserver::new(store.clone(), model(), settings);
        let u = 1.0;
        let state = vec![0.0; 6];

        // Fraction 0.05: below the first threshold.
        obs.on_step(1.0, &state, &[0.95; 6], 1.0, u);
        assert_eq!(obs.state().last_flux_output, 0.0);
        assert!(!store.output_path(0.1).exists());

        // Fraction 0.35: crosses, but only one snapshot per step.
        obs.on_step(2.0, &state, &[0.65; 6], 1.0, u);
        assert!((obs.state().last_flux_output - 0.1).abs() < 1e-12);
        assert!(store.output_path(0.1).exists());
        assert!(!store.checkpoint_path().exists());

        // Third step exceeds checkpoint_every = 2.
        obs.on_step(3.0, &state, &[0.65; 6], 1.0, u);
        assert!((obs.state().last_flux_output - 0.2).abs() < 1e-12);
        assert!(store.checkpoint_path().exists());
        assert_eq!(obs.state().counter, 0);

        let record = store.load_checkpoint().unwrap();
        assert_eq!(record.t, 3.0);
        assert_eq!(record.observer.model_times, vec![1.0, 2.0, 3.0]);
        assert_eq!(record.observer.counter, 0);
        assert_eq!(obs.state().flux.len(), 3);
    }

    #[test]
    fn undefined_fraction_still_counts_toward_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path(), "guard");
        let settings = ObserverSettings { checkpoint_every: 0, output_every: 0.1 };
        let mut obs = SteppingObserver::new(store.clone(), model(), settings);
        obs.on_step(1.0, &[0.0; 6], &[0.0; 6], 1.0, 0.0);
        assert!(obs.state().flux.is_empty());
        assert!(store.checkpoint_path().exists());
    }

    #[test]
    fn failed_writes_are_skipped_and_state_still_advances() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = RunStore::new(blocker.join("out"), "blocked");
        let settings = ObserverSettings { checkpoint_every: 0, output_every: 0.1 };
        let mut obs = SteppingObserver::new(store.clone(), model(), settings);

        obs.on_step(1.0, &[0.0; 6], &[0.0; 6], 1.0, 1.0);

        assert_eq!(obs.state().model_times, vec![1.0]);
        assert_eq!(obs.state().flux, vec![1.0]);
        assert_eq!(obs.state().counter, 0);
        assert!((obs.state().last_flux_output - 0.1).abs() < 1e-12);
        assert!(!store.checkpoint_path().exists());
        assert!(!store.output_path(0.1).exists());
    }
}
