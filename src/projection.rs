// 🎲 Monte Carlo Projector
// Compounds the starting value through `years` annual returns drawn from
// Normal(mean_return, volatility), once per trial. Terminal values are
// summarized with nearest-rank percentiles: the value at
// floor(fraction * trials) of the ascending sample, never interpolated.
//
// The generator is always supplied by the caller, so a fixed seed pins the
// output exactly. Callers must not share one generator across concurrent runs.

use crate::error::{EngineError, EngineResult};
use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

pub const DEFAULT_YEARS: i32 = 10;
pub const DEFAULT_TRIALS: i32 = 1000;
pub const DEFAULT_MEAN_RETURN: f64 = 0.07;
pub const DEFAULT_VOLATILITY: f64 = 0.15;
pub const DEFAULT_MAX_YEARS: i32 = 100;
pub const DEFAULT_MAX_TRIALS: i32 = 100_000;

const P10: f64 = 0.10;
const P50: f64 = 0.50;
const P90: f64 = 0.90;

/// Simulation inputs. Signed counts so that out-of-range requests can be
/// rejected with a typed error instead of wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub current_value: f64,
    pub years: i32,
    pub trials: i32,
    pub mean_return: f64,
    pub volatility: f64,
    /// Upper bounds checked before any trial runs
    pub max_years: i32,
    pub max_trials: i32,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            current_value: 0.0,
            years: DEFAULT_YEARS,
            trials: DEFAULT_TRIALS,
            mean_return: DEFAULT_MEAN_RETURN,
            volatility: DEFAULT_VOLATILITY,
            max_years: DEFAULT_MAX_YEARS,
            max_trials: DEFAULT_MAX_TRIALS,
        }
    }
}

impl ProjectionParams {
    pub fn with_current_value(mut self, current_value: f64) -> Self {
        self.current_value = current_value;
        self
    }

    /// Reject configurations that cannot produce a meaningful distribution.
    pub fn validate(&self) -> EngineResult<()> {
        if self.trials <= 0 {
            return Err(invalid(format!("trials must be positive, got {}", self.trials)));
        }
        if self.trials > self.max_trials {
            return Err(invalid(format!(
                "trials cannot exceed {}, got {}",
                self.max_trials, self.trials
            )));
        }
        if self.years < 0 {
            return Err(invalid(format!("years cannot be negative, got {}", self.years)));
        }
        if self.years > self.max_years {
            return Err(invalid(format!(
                "years cannot exceed {}, got {}",
                self.max_years, self.years
            )));
        }
        if !self.mean_return.is_finite() {
            return Err(invalid("mean_return must be a finite number".to_string()));
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(invalid(format!(
                "volatility must be a non-negative finite number, got {}",
                self.volatility
            )));
        }
        if !self.current_value.is_finite() || self.current_value < 0.0 {
            return Err(invalid(format!(
                "current_value must be a non-negative finite amount, got {}",
                self.current_value
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> EngineError {
    EngineError::InvalidConfiguration(message)
}

/// Percentile summary of the simulated terminal values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    pub current_value: f64,
    pub years: i32,
    pub trials: i32,
}

/// Run the simulation with a caller-supplied generator.
///
/// Fails before any trial runs when the parameters are invalid.
pub fn project<R: Rng + ?Sized>(params: &ProjectionParams, rng: &mut R) -> EngineResult<Projection> {
    params.validate()?;

    let returns = Normal::new(params.mean_return, params.volatility)
        .map_err(|e| invalid(format!("cannot build return distribution: {}", e)))?;

    let trials = params.trials as usize;
    let mut terminal_values = Vec::with_capacity(trials);

    for _ in 0..trials {
        let mut value = params.current_value;
        for _ in 0..params.years {
            let annual_return = returns.sample(&mut *rng);
            value *= 1.0 + annual_return;
        }
        terminal_values.push(value);
    }

    terminal_values.sort_by(|a, b| a.total_cmp(b));

    let projection = Projection {
        p10: nearest_rank(&terminal_values, P10),
        p50: nearest_rank(&terminal_values, P50),
        p90: nearest_rank(&terminal_values, P90),
        current_value: params.current_value,
        years: params.years,
        trials: params.trials,
    };

    debug!(
        "Projected {} trials over {} years: p10={:.2} p50={:.2} p90={:.2}",
        params.trials, params.years, projection.p10, projection.p50, projection.p90
    );

    Ok(projection)
}

/// Reproducible run: the same params and seed always give the same result.
pub fn project_seeded(params: &ProjectionParams, seed: u64) -> EngineResult<Projection> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    project(params, &mut rng)
}

/// Run with a fresh OS-seeded generator owned by this call alone.
pub fn project_with_entropy(params: &ProjectionParams) -> EngineResult<Projection> {
    let mut rng = ChaCha8Rng::from_entropy();
    project(params, &mut rng)
}

/// Nearest-rank lookup into an ascending, non-empty sample.
pub fn nearest_rank(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (fraction * sorted.len() as f64).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}
