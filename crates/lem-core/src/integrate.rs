//! Embedded Runge–Kutta time integration with adaptive step control.
//!
//! The derivative is only ever reached through [`OdeSystem`]; it may be
//! evaluated several times per accepted step (trial stages, rejected steps).
//! Steps are shortened to land exactly on every requested output time.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LemError, LemResult};

/// Right-hand side `dy/dt = f(t, y)`.
pub trait OdeSystem {
    fn rate(&mut self, t: f64, y: &[f64]) -> LemResult<Vec<f64>>;
}

impl<F> OdeSystem for F
where
    F: FnMut(f64, &[f64]) -> LemResult<Vec<f64>>,
{
    fn rate(&mut self, t: f64, y: &[f64]) -> LemResult<Vec<f64>> {
        self(t, y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Dormand–Prince 5(4).
    #[default]
    Rk45,
    /// Bogacki–Shampine 3(2).
    Rk23,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrationOptions {
    #[serde(default)]
    pub method: Method,
    pub rtol: f64,
    pub atol: f64,
    /// Upper bound on any step; `None` for unbounded.
    #[serde(default)]
    pub max_step: Option<f64>,
    /// Initial step; chosen automatically when `None`.
    #[serde(default)]
    pub first_step: Option<f64>,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self { method: Method::Rk45, rtol: 1e-3, atol: 1e-6, max_step: None, first_step: None }
    }
}

/// States at the requested output times plus solver statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub t: Vec<f64>,
    pub y: Vec<Vec<f64>>,
    /// Right-hand-side evaluations.
    pub nfev: u64,
    pub n_accepted: u64,
    pub n_rejected: u64,
    pub success: bool,
    pub message: String,
}

struct Tableau {
    c: &'static [f64],
    a: &'static [&'static [f64]],
    b: &'static [f64],
    /// Error weights over all stages plus the FSAL stage.
    e: &'static [f64],
    error_order: i32,
}

const DOPRI5: Tableau = Tableau {
    c: &[0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0],
    a: &[
        &[],
        &[1.0 / 5.0],
        &[3.0 / 40.0, 9.0 / 40.0],
        &[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
        &[19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0],
        &[9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0],
    ],
    b: &[35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0],
    e: &[
        -71.0 / 57600.0,
        0.0,
        71.0 / 16695.0,
        -71.0 / 1920.0,
        17253.0 / 339200.0,
        -22.0 / 525.0,
        1.0 / 40.0,
    ],
    error_order: 4,
};

const BOGACKI_SHAMPINE: Tableau = Tableau {
    c: &[0.0, 1.0 / 2.0, 3.0 / 4.0],
    a: &[&[], &[1.0 / 2.0], &[0.0, 3.0 / 4.0]],
    b: &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0],
    e: &[5.0 / 72.0, -1.0 / 12.0, -1.0 / 9.0, 1.0 / 8.0],
    error_order: 2,
};

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

impl Method {
    fn tableau(self) -> &'static Tableau {
        match self {
            Method::Rk45 => &DOPRI5,
            Method::Rk23 => &BOGACKI_SHAMPINE,
        }
    }
}

/// Integrate `system` from `y0` over `t_span`, recording the state at every
/// time in `t_eval` (sorted ascending, inside the span). With an empty
/// `t_eval` only the final state is recorded.
pub fn integrate<S: OdeSystem + ?Sized>(
    system: &mut S,
    y0: Vec<f64>,
    t_span: (f64, f64),
    t_eval: &[f64],
    options: &IntegrationOptions,
) -> LemResult<IntegrationResult> {
    let (t0, t_end) = t_span;
    if !(t0.is_finite() && t_end.is_finite()) || t_end < t0 {
        return Err(LemError::Integration(format!("invalid time span ({t0}, {t_end})")));
    }
    if !(options.rtol > 0.0 && options.atol >= 0.0) {
        return Err(LemError::Integration("rtol must be > 0 and atol >= 0".into()));
    }
    if t_eval.windows(2).any(|w| w[1] < w[0]) || t_eval.iter().any(|&t| t < t0 || t > t_end) {
        return Err(LemError::Integration("t_eval must be sorted and inside t_span".into()));
    }

    let tab = options.method.tableau();
    let max_step = options.max_step.unwrap_or(f64::INFINITY);
    let mut stats = Stats::default();

    let mut t = t0;
    let mut y = y0;
    let mut f = eval(system, t, &y, &mut stats)?;

    let mut ts = Vec::with_capacity(t_eval.len().max(1));
    let mut ys = Vec::with_capacity(t_eval.len().max(1));
    let mut next_out = 0;
    while next_out < t_eval.len() && t_eval[next_out] <= t {
        ts.push(t);
        ys.push(y.clone());
        next_out += 1;
    }

    let first = match options.first_step {
        Some(h) => h,
        None => initial_step(system, t, &y, &f, t_end - t, tab.error_order, options, &mut stats)?,
    };
    let mut h = first.min(max_step);

    while t < t_end {
        let target = t_eval.get(next_out).copied().unwrap_or(t_end).min(t_end);
        let min_step = 10.0 * next_after_gap(t);
        if h < min_step {
            return Err(LemError::Integration(format!("step size underflow at t={t} (h={h})")));
        }

        let mut step = h.min(target - t);
        let landed = step >= target - t;
        if landed {
            step = target - t;
        }

        let (y_new, f_new, err) = rk_step(system, tab, t, &y, &f, step, &mut stats)?;
        let norm = error_norm(&err, &y, &y_new, options);

        if norm < 1.0 {
            let factor = if norm == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * norm.powf(-1.0 / (tab.error_order as f64 + 1.0))).min(MAX_FACTOR)
            };
            t = if landed { target } else { t + step };
            y = y_new;
            f = f_new;
            stats.accepted += 1;
            // A step clipped to an output time says nothing about the
            // proposal that preceded it.
            let proposal = if landed && step < h { h.max(step * factor) } else { step * factor };
            h = proposal.min(max_step);

            while next_out < t_eval.len() && t_eval[next_out] <= t {
                ts.push(t);
                ys.push(y.clone());
                next_out += 1;
            }
        } else {
            stats.rejected += 1;
            h = step * (SAFETY * norm.powf(-1.0 / (tab.error_order as f64 + 1.0))).max(MIN_FACTOR);
        }
    }

    if t_eval.is_empty() {
        ts.push(t);
        ys.push(y);
    }

    debug!(
        nfev = stats.nfev,
        accepted = stats.accepted,
        rejected = stats.rejected,
        "integration finished"
    );

    Ok(IntegrationResult {
        t: ts,
        y: ys,
        nfev: stats.nfev,
        n_accepted: stats.accepted,
        n_rejected: stats.rejected,
        success: true,
        message: "the solver successfully reached the end of the integration interval".into(),
    })
}

#[derive(Debug, Default)]
struct Stats {
    nfev: u64,
    accepted: u64,
    rejected: u64,
}

fn eval<S: OdeSystem + ?Sized>(system: &mut S, t: f64, y: &[f64], stats: &mut Stats) -> LemResult<Vec<f64>> {
    stats.nfev += 1;
    let f = system.rate(t, y)?;
    if f.len() != y.len() {
        return Err(LemError::Shape { what: "rate vector", expected: y.len(), actual: f.len() });
    }
    Ok(f)
}

/// One embedded step. Returns `(y_new, f(t + h, y_new), error estimate)`.
fn rk_step<S: OdeSystem + ?Sized>(
    system: &mut S,
    tab: &Tableau,
    t: f64,
    y: &[f64],
    f: &[f64],
    h: f64,
    stats: &mut Stats,
) -> LemResult<(Vec<f64>, Vec<f64>, Vec<f64>)> {
    let n = y.len();
    let stages = tab.b.len();
    let mut k: Vec<Vec<f64>> = Vec::with_capacity(stages + 1);
    k.push(f.to_vec());

    for s in 1..stages {
        let mut ys = y.to_vec();
        for (j, &a) in tab.a[s].iter().enumerate() {
            if a != 0.0 {
                for (yi, kj) in ys.iter_mut().zip(&k[j]) {
                    *yi += h * a * kj;
                }
            }
        }
        k.push(eval(system, t + tab.c[s] * h, &ys, stats)?);
    }

    let mut y_new = y.to_vec();
    for (j, &b) in tab.b.iter().enumerate() {
        if b != 0.0 {
            for (yi, kj) in y_new.iter_mut().zip(&k[j]) {
                *yi += h * b * kj;
            }
        }
    }

    let f_new = eval(system, t + h, &y_new, stats)?;
    k.push(f_new.clone());

    let mut err = vec![0.0; n];
    for (j, &e) in tab.e.iter().enumerate() {
        if e != 0.0 {
            for (ei, kj) in err.iter_mut().zip(&k[j]) {
                *ei += h * e * kj;
            }
        }
    }

    Ok((y_new, f_new, err))
}

/// RMS of the error scaled by `atol + rtol · max(|y|, |y_new|)`.
fn error_norm(err: &[f64], y: &[f64], y_new: &[f64], options: &IntegrationOptions) -> f64 {
    if err.is_empty() {
        return 0.0;
    }
    let sum: f64 = err
        .iter()
        .zip(y.iter().zip(y_new))
        .map(|(&e, (&a, &b))| {
            let scale = options.atol + options.rtol * a.abs().max(b.abs());
            (e / scale).powi(2)
        })
        .sum();
    (sum / err.len() as f64).sqrt()
}

fn rms_scaled(v: &[f64], scale: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().zip(scale).map(|(&x, &s)| (x / s).powi(2)).sum();
    (sum / v.len() as f64).sqrt()
}

/// Hairer, Nørsett & Wanner (1993), II.4 starting step.
#[allow(clippy::too_many_arguments)]
fn initial_step<S: OdeSystem + ?Sized>(
    system: &mut S,
    t0: f64,
    y0: &[f64],
    f0: &[f64],
    interval: f64,
    error_order: i32,
    options: &IntegrationOptions,
    stats: &mut Stats,
) -> LemResult<f64> {
    if interval == 0.0 || y0.is_empty() {
        return Ok(interval);
    }
    let scale: Vec<f64> = y0.iter().map(|&y| options.atol + y.abs() * options.rtol).collect();
    let d0 = rms_scaled(y0, &scale);
    let d1 = rms_scaled(f0, &scale);
    let h0 = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 } else { 0.01 * d0 / d1 };
    let h0 = h0.min(interval);

    let y1: Vec<f64> = y0.iter().zip(f0).map(|(&y, &f)| y + h0 * f).collect();
    let f1 = eval(system, t0 + h0, &y1, stats)?;
    let df: Vec<f64> = f1.iter().zip(f0).map(|(&a, &b)| a - b).collect();
    let d2 = rms_scaled(&df, &scale) / h0;

    let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
        (h0 * 1e-3).max(1e-6)
    } else {
        (0.01 / d1.max(d2)).powf(1.0 / (error_order as f64 + 1.0))
    };
    Ok((100.0 * h0).min(h1).min(interval))
}

/// Spacing between `t` and the next representable value.
fn next_after_gap(t: f64) -> f64 {
    let a = t.abs();
    if a == 0.0 {
        f64::MIN_POSITIVE
    } else {
        f64::from_bits(a.to_bits() + 1) - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn decay(_t: f64, y: &[f64]) -> LemResult<Vec<f64>> {
        Ok(y.iter().map(|&v| -0.5 * v).collect())
    }

    #[test]
    fn exponential_decay_matches_closed_form() {
        for method in [Method::Rk45, Method::Rk23] {
            let opts = IntegrationOptions { method, rtol: 1e-8, atol: 1e-10, ..Default::default() };
            let t_eval = [0.0, 1.0, 2.5, 4.0];
            let mut sys = decay;
            let res = integrate(&mut sys, vec![2.0, -1.0], (0.0, 4.0), &t_eval, &opts).unwrap();
            assert_eq!(res.t, t_eval.to_vec());
            for (t, y) in res.t.iter().zip(&res.y) {
                assert_relative_eq!(y[0], 2.0 * (-0.5 * t).exp(), max_relative = 1e-6);
                assert_relative_eq!(y[1], -(-0.5 * t).exp(), max_relative = 1e-6);
            }
            assert!(res.success);
        }
    }

    #[test]
    fn max_step_bounds_every_step() {
        let opts = IntegrationOptions { max_step: Some(0.1), ..Default::default() };
        let mut sys = |_t: f64, y: &[f64]| -> LemResult<Vec<f64>> { Ok(vec![0.0; y.len()]) };
        let res = integrate(&mut sys, vec![1.0], (0.0, 1.0), &[], &opts).unwrap();
        assert!(res.n_accepted >= 10);
        assert_eq!(res.t, vec![1.0]);
        assert_eq!(res.y[0], vec![1.0]);
    }

    #[test]
    fn errors_from_the_system_propagate() {
        let mut sys = |t: f64, _y: &[f64]| -> LemResult<Vec<f64>> {
            Err(LemError::NumericInstability { t, detail: "boom".into() })
        };
        let err = integrate(&mut sys, vec![1.0], (0.0, 1.0), &[], &IntegrationOptions::default());
        assert!(matches!(err, Err(LemError::NumericInstability { .. })));
    }

    #[test]
    fn unsorted_output_times_are_rejected() {
        let mut sys = decay;
        let err = integrate(&mut sys, vec![1.0], (0.0, 1.0), &[0.5, 0.2], &IntegrationOptions::default());
        assert!(matches!(err, Err(LemError::Integration(_))));
    }
}
