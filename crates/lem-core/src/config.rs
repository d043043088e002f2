//! Run configuration: one JSON document describing the grid, the physics,
//! the initial surface, the observer cadence and the integration schedule.
//! Every field has a default taken from the reference experiment, so a
//! config file only needs to name what it changes.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LemError, LemResult};
use crate::flow::RoutingOptions;
use crate::grid::GridShape;
use crate::integrate::IntegrationOptions;
use crate::observer::ObserverSettings;
use crate::params::{ModelConfig, StreamPowerParams};
use crate::store::{read_json, write_json_atomic, RunStore};

// ── Initial condition ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialCondition {
    /// Regional gradient away from the central ridge (m/m).
    pub slope: f64,
    /// Amplitude of the uniform noise in the generated surface (m).
    pub noise_level: f64,
    /// Optional JSON grid added to the generated surface.
    pub perturbation: Option<PathBuf>,
    pub seed: u64,
}

impl Default for InitialCondition {
    fn default() -> Self {
        Self { slope: 5e-4, noise_level: 0.0, perturbation: None, seed: 1 }
    }
}

// ── Output schedule ─────────────────────────────────────────────────────────

/// Output times `first + k · t_end / count` strictly below `t_end`, where
/// `t_end = time_factor · time_to_steady_state`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSchedule {
    pub first: f64,
    pub count: usize,
    pub time_factor: f64,
}

impl Default for EvalSchedule {
    fn default() -> Self {
        Self { first: 10.0, count: 150, time_factor: 1.5 }
    }
}

impl EvalSchedule {
    pub fn end_time(&self, time_to_steady_state: f64) -> f64 {
        self.time_factor * time_to_steady_state
    }

    pub fn times(&self, time_to_steady_state: f64) -> Vec<f64> {
        let t_end = self.end_time(time_to_steady_state);
        let step = t_end / self.count as f64;
        (0..)
            .map(|k| self.first + k as f64 * step)
            .take_while(|&t| t < t_end)
            .collect()
    }

    /// The same schedule restricted to times after a restart point.
    pub fn times_after(&self, time_to_steady_state: f64, t0: f64) -> Vec<f64> {
        self.times(time_to_steady_state).into_iter().filter(|&t| t > t0).collect()
    }

    fn validate(&self) -> LemResult<()> {
        if self.count == 0 {
            return Err(LemError::config("schedule count must be at least 1"));
        }
        if !(self.time_factor.is_finite() && self.time_factor > 0.0) {
            return Err(LemError::config(format!(
                "time_factor must be positive, got {}",
                self.time_factor
            )));
        }
        if !(self.first.is_finite() && self.first >= 0.0) {
            return Err(LemError::config(format!(
                "first output time must be non-negative, got {}",
                self.first
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub options: IntegrationOptions,
    pub schedule: EvalSchedule,
}

// ── Run configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Prefix of every file the run writes.
    pub run_name: String,
    pub output_dir: PathBuf,
    pub ny: usize,
    pub nx: usize,
    /// Grid spacing (m).
    pub dx: f64,
    pub stream_power: StreamPowerParams,
    pub routing: RoutingOptions,
    /// Per-evaluation re-noising amplitude (m); `None` disables it.
    pub renoise: Option<f64>,
    /// Seed of the re-noising generator.
    pub seed: u64,
    pub initial: InitialCondition,
    pub observer: ObserverSettings,
    pub integration: IntegrationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_name: "lem".to_string(),
            output_dir: PathBuf::from("."),
            ny: 2000,
            nx: 4000,
            dx: 10.0,
            stream_power: StreamPowerParams::default(),
            routing: RoutingOptions::default(),
            renoise: Some(1e-4),
            seed: 0,
            initial: InitialCondition::default(),
            observer: ObserverSettings::default(),
            integration: IntegrationConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> LemResult<Self> {
        let config: RunConfig = read_json(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> LemResult<()> {
        write_json_atomic(path, self)
    }

    /// Checks the parts of the configuration that are not re-checked when
    /// the model is built.
    pub fn validate(&self) -> LemResult<()> {
        if self.run_name.trim().is_empty() {
            return Err(LemError::config("run_name must not be empty"));
        }
        GridShape::new(self.ny, self.nx)?;
        if !self.initial.slope.is_finite() || !self.initial.noise_level.is_finite() {
            return Err(LemError::config("initial slope and noise_level must be finite"));
        }
        if !(self.observer.output_every.is_finite() && self.observer.output_every > 0.0) {
            return Err(LemError::config(format!(
                "output_every must be positive, got {}",
                self.observer.output_every
            )));
        }
        self.integration.schedule.validate()
    }

    pub fn shape(&self) -> LemResult<GridShape> {
        GridShape::new(self.ny, self.nx)
    }

    /// The persisted model description a checkpoint carries.
    pub fn model_config(&self) -> LemResult<ModelConfig> {
        Ok(ModelConfig {
            shape: self.shape()?,
            dx: self.dx,
            stream_power: self.stream_power,
            routing: self.routing,
            renoise: self.renoise,
            seed: self.seed,
        })
    }

    pub fn store(&self) -> RunStore {
        RunStore::new(&self.output_dir, &self.run_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reference_schedule_has_150_points() {
        let s = EvalSchedule::default();
        let times = s.times(2.0e6);
        assert_eq!(times.len(), 150);
        assert_eq!(times[0], 10.0);
        assert_relative_eq!(times[1], 10.0 + 20_000.0);
        assert!(*times.last().unwrap() < 3.0e6);
    }

    #[test]
    fn restart_schedule_keeps_only_later_times() {
        let s = EvalSchedule { first: 1.0, count: 4, time_factor: 1.0 };
        assert_eq!(s.times(8.0), vec![1.0, 3.0, 5.0, 7.0]);
        assert_eq!(s.times_after(8.0, 3.0), vec![5.0, 7.0]);
        assert!(s.times_after(8.0, 7.5).is_empty());
    }

    #[test]
    fn partial_document_takes_defaults() {
        let json = r#"{ "run_name": "small", "ny": 12, "nx": 8,
                        "stream_power": { "l": 30.0, "L": 5000.0, "Rf": 500.0,
                          "time_to_steady_state": 1e5, "Pe": 3.0,
                          "ka": 0.379, "h": 1.895, "m": 0.1 } }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.dx, 10.0);
        assert_eq!(config.renoise, Some(1e-4));
        assert_eq!(config.stream_power.basin_length, 5000.0);
        assert_eq!(config.observer.checkpoint_every, 10);
        assert_eq!(config.integration.schedule.count, 150);
    }

    #[test]
    fn invalid_documents_are_rejected() {
        let mut c = RunConfig { ny: 2, ..RunConfig::default() };
        assert!(matches!(c.validate(), Err(LemError::Configuration(_))));
        c = RunConfig { run_name: " ".into(), ..RunConfig::default() };
        assert!(c.validate().is_err());
        c = RunConfig::default();
        c.integration.schedule.count = 0;
        assert!(c.validate().is_err());
        c = RunConfig::default();
        c.observer.output_every = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let config = RunConfig { run_name: "ridge".into(), ny: 5, nx: 5, ..RunConfig::default() };
        config.save(&path).unwrap();
        assert_eq!(RunConfig::load(&path).unwrap(), config);
    }
}
