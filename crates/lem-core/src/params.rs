//! Model parameters and the closed-form derivation of K, U and D.
//!
//! The six primary inputs describe the landscape to be reached at steady
//! state; `K`, `U` and `D` follow from integrating the stream-power law along
//! a Hack's-law channel (`A = ka · x^h`) from channel head `l` to basin length
//! `L`:
//!
//! ```text
//!   K = (1 / T) · ka^(−m) · (1 − hm)^(−1) · (L^(1−hm) − l^(1−hm))
//!   U = Rf · K · ka^m · (1 − hm) / (L^(1−hm) − l^(1−hm))
//!   D = K · l^(hm+1) · ka^m / Pe
//! ```
use serde::{Deserialize, Serialize};

use crate::error::{LemError, LemResult};
use crate::flow::RoutingOptions;
use crate::flux::FluxParams;
use crate::grid::GridShape;

/// Primary physical inputs. All must be strictly positive and finite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamPowerParams {
    /// Hillslope length / channel-head distance (m).
    pub l: f64,
    /// Basin length (m).
    #[serde(rename = "L")]
    pub basin_length: f64,
    /// Relief to uplift-rate ratio.
    #[serde(rename = "Rf")]
    pub rf: f64,
    /// Time for the initial surface to reach steady state.
    pub time_to_steady_state: f64,
    /// Péclet number (advective vs. diffusive transport at the channel head).
    #[serde(rename = "Pe")]
    pub pe: f64,
    /// Hack's-law coefficient.
    pub ka: f64,
    /// Hack's-law exponent.
    pub h: f64,
    /// Drainage-area exponent of the stream-power law.
    pub m: f64,
}

impl Default for StreamPowerParams {
    fn default() -> Self {
        Self {
            l: 30.0,
            basin_length: 10_000.0,
            rf: 1000.0,
            time_to_steady_state: 2.0e6,
            pe: 3.0,
            ka: 0.379,
            h: 1.895,
            m: 0.1,
        }
    }
}

impl StreamPowerParams {
    fn validate(&self) -> LemResult<()> {
        let named = [
            ("l", self.l),
            ("L", self.basin_length),
            ("Rf", self.rf),
            ("time_to_steady_state", self.time_to_steady_state),
            ("Pe", self.pe),
            ("ka", self.ka),
            ("h", self.h),
            ("m", self.m),
        ];
        for (name, v) in named {
            if !(v.is_finite() && v > 0.0) {
                return Err(LemError::config(format!("{name} must be positive and finite, got {v}")));
            }
        }
        Ok(())
    }
}

/// Derived coefficients, fixed for the life of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalConstants {
    pub k: f64,
    pub u: f64,
    pub d: f64,
}

/// Derive `(K, U, D)` from the primary parameters.
pub fn calc_k_u_d(p: &StreamPowerParams) -> LemResult<PhysicalConstants> {
    p.validate()?;

    let hm = p.h * p.m;
    let one_minus_hm = 1.0 - hm;
    if one_minus_hm == 0.0 {
        return Err(LemError::config(format!(
            "degenerate concavity/stream-power exponent: h*m = {hm}"
        )));
    }
    let length_term = p.basin_length.powf(one_minus_hm) - p.l.powf(one_minus_hm);
    if length_term == 0.0 {
        return Err(LemError::config(format!(
            "degenerate concavity/stream-power exponent: L^(1-hm) == l^(1-hm) (l = {}, L = {})",
            p.l, p.basin_length
        )));
    }

    let k = p.time_to_steady_state.powf(-1.0)
        * p.ka.powf(-p.m)
        * one_minus_hm.powf(-1.0)
        * length_term;
    let u = p.rf * k * p.ka.powf(p.m) * one_minus_hm * length_term.powf(-1.0);
    let d = k * p.l.powf(hm + 1.0) * p.ka.powf(p.m) / p.pe;

    if !(k.is_finite() && u.is_finite() && d.is_finite()) {
        return Err(LemError::config(format!(
            "derived constants are not finite: K = {k}, U = {u}, D = {d}"
        )));
    }
    Ok(PhysicalConstants { k, u, d })
}

/// Everything needed to rebuild the derivative function. This is what a
/// checkpoint persists; `K`, `U`, `D` are re-derived on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub shape: GridShape,
    /// Grid spacing (m).
    pub dx: f64,
    pub stream_power: StreamPowerParams,
    #[serde(default)]
    pub routing: RoutingOptions,
    /// Amplitude of the uniform noise added to the working copy of the state
    /// on every evaluation.
    #[serde(default)]
    pub renoise: Option<f64>,
    /// Seed for the re-noising generator.
    #[serde(default)]
    pub seed: u64,
}

/// Validated configuration plus its derived constants.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParameters {
    config: ModelConfig,
    constants: PhysicalConstants,
}

impl ModelParameters {
    pub fn new(config: ModelConfig) -> LemResult<Self> {
        if !(config.dx.is_finite() && config.dx > 0.0) {
            return Err(LemError::config(format!("dx must be positive, got {}", config.dx)));
        }
        GridShape::new(config.shape.ny, config.shape.nx)?;
        if let Some(amp) = config.renoise {
            if !(amp.is_finite() && amp >= 0.0) {
                return Err(LemError::config(format!("renoise must be non-negative, got {amp}")));
            }
        }
        let constants = calc_k_u_d(&config.stream_power)?;
        tracing::info!(
            k = constants.k,
            u = constants.u,
            d = constants.d,
            "derived stream-power constants"
        );
        Ok(Self { config, constants })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn constants(&self) -> PhysicalConstants {
        self.constants
    }

    pub fn shape(&self) -> GridShape {
        self.config.shape
    }

    pub fn flux_params(&self) -> FluxParams {
        FluxParams {
            dx: self.config.dx,
            k: self.constants.k,
            u: self.constants.u,
            d: self.constants.d,
            m: self.config.stream_power.m,
        }
    }
}
