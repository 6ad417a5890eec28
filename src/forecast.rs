//! Stochastic forecast of the Lee-Carter time index
//!
//! kt follows a random walk with drift estimated from its historical first
//! differences. Each simulation draws its own innovations from an independent
//! RNG stream derived from a master seed, so a forecast is reproducible for a
//! given seed regardless of how rayon schedules the simulations.

use log::{debug, info};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{LongevityError, Result};
use crate::mortality::FittedMortalityModel;
use crate::stats;

/// Default number of forecast years
pub const DEFAULT_HORIZON: usize = 40;

/// Default number of Monte Carlo simulations
pub const DEFAULT_SIMULATIONS: usize = 5000;

/// Configuration for a forecast run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Number of years to project
    pub horizon: usize,

    /// Number of simulated paths
    pub simulations: usize,

    /// Master seed; drawn from OS entropy when None
    pub seed: Option<u64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: DEFAULT_HORIZON,
            simulations: DEFAULT_SIMULATIONS,
            seed: None,
        }
    }
}

/// Random walk with drift parameters for kt
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RandomWalkParams {
    /// Mean of the first differences of kt
    pub drift: f64,

    /// Population standard deviation of the first differences
    pub volatility: f64,
}

impl RandomWalkParams {
    /// Estimate from a historical kt series (needs at least 2 values)
    pub fn estimate(kt: &[f64]) -> Result<Self> {
        if kt.len() < 2 {
            return Err(LongevityError::InvalidInput(format!(
                "need at least 2 kt values to estimate drift, got {}",
                kt.len()
            )));
        }
        let diffs: Vec<f64> = kt.windows(2).map(|w| w[1] - w[0]).collect();
        Ok(Self {
            drift: stats::mean(&diffs),
            volatility: stats::population_std_dev(&diffs),
        })
    }
}

/// Seed for simulation `stream` derived from the master seed (SplitMix64 mix)
pub fn stream_seed(master: u64, stream: u64) -> u64 {
    let mut z = master.wrapping_add(stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Projected central death rates indexed (age, forecast year, simulation)
///
/// Stored simulation-major so each simulation's block is contiguous.
#[derive(Debug, Clone)]
pub struct ForecastSurface {
    n_ages: usize,
    horizon: usize,
    simulations: usize,
    rates: Vec<f64>,
}

impl ForecastSurface {
    /// Build from a flat simulation-major buffer; every rate must be finite and > 0
    pub fn from_parts(n_ages: usize, horizon: usize, simulations: usize, rates: Vec<f64>) -> Result<Self> {
        let expected = n_ages * horizon * simulations;
        if rates.len() != expected {
            return Err(LongevityError::dimension("forecast surface buffer", expected, rates.len()));
        }
        if let Some(bad) = rates.iter().find(|m| !m.is_finite() || **m <= 0.0) {
            return Err(LongevityError::Numerical(format!(
                "projected mortality rate {} is not a positive finite number",
                bad
            )));
        }
        Ok(Self {
            n_ages,
            horizon,
            simulations,
            rates,
        })
    }

    /// Build by evaluating `f(age, year, sim)` at every cell
    pub fn from_fn<F>(n_ages: usize, horizon: usize, simulations: usize, f: F) -> Result<Self>
    where
        F: Fn(usize, usize, usize) -> f64,
    {
        let mut rates = Vec::with_capacity(n_ages * horizon * simulations);
        for sim in 0..simulations {
            for year in 0..horizon {
                for age in 0..n_ages {
                    rates.push(f(age, year, sim));
                }
            }
        }
        Self::from_parts(n_ages, horizon, simulations, rates)
    }

    #[inline]
    fn index(&self, age: usize, year: usize, sim: usize) -> usize {
        (sim * self.horizon + year) * self.n_ages + age
    }

    /// Central death rate for `age` row in forecast `year` of simulation `sim`
    #[inline]
    pub fn rate(&self, age: usize, year: usize, sim: usize) -> f64 {
        self.rates[self.index(age, year, sim)]
    }

    pub fn n_ages(&self) -> usize {
        self.n_ages
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn simulations(&self) -> usize {
        self.simulations
    }

    /// (ages, forecast years, simulations)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.n_ages, self.horizon, self.simulations)
    }
}

/// One row of kt fan chart data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KtFanChartRow {
    pub year: u32,
    pub p5: f64,
    pub median: f64,
    pub p95: f64,
}

/// Output of a forecast run
#[derive(Debug, Clone)]
pub struct MortalityForecast {
    /// Simulated kt, horizon x simulations
    kt_forecasts: DMatrix<f64>,
    surface: ForecastSurface,
    params: RandomWalkParams,
    seed: u64,
}

impl MortalityForecast {
    /// Simulated kt paths (rows = forecast years, columns = simulations)
    pub fn kt_forecasts(&self) -> &DMatrix<f64> {
        &self.kt_forecasts
    }

    pub fn surface(&self) -> &ForecastSurface {
        &self.surface
    }

    pub fn params(&self) -> RandomWalkParams {
        self.params
    }

    /// Master seed actually used (replay the run by configuring this seed)
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// 5th / 50th / 95th percentile of simulated kt per forecast year
    pub fn kt_fan_chart(&self, last_historical_year: u32) -> Vec<KtFanChartRow> {
        (0..self.kt_forecasts.nrows())
            .map(|h| {
                let row: Vec<f64> = self.kt_forecasts.row(h).iter().copied().collect();
                let sorted = stats::sorted_copy(&row);
                KtFanChartRow {
                    year: last_historical_year + 1 + h as u32,
                    p5: stats::percentile_sorted(&sorted, 5.0),
                    median: stats::percentile_sorted(&sorted, 50.0),
                    p95: stats::percentile_sorted(&sorted, 95.0),
                }
            })
            .collect()
    }
}

/// Projects a fitted model forward under a random walk with drift
pub struct StochasticForecaster<'a> {
    model: &'a FittedMortalityModel,
    config: ForecastConfig,
}

impl<'a> StochasticForecaster<'a> {
    pub fn new(model: &'a FittedMortalityModel, config: ForecastConfig) -> Result<Self> {
        if config.horizon < 1 {
            return Err(LongevityError::InvalidInput("forecast horizon must be at least 1".into()));
        }
        if config.simulations < 1 {
            return Err(LongevityError::InvalidInput("simulation count must be at least 1".into()));
        }
        Ok(Self { model, config })
    }

    /// Simulate kt paths and the corresponding mortality surfaces
    pub fn predict(&self) -> Result<MortalityForecast> {
        let horizon = self.config.horizon;
        let simulations = self.config.simulations;
        let n_ages = self.model.n_ages();

        let params = RandomWalkParams::estimate(self.model.kt())?;
        let innovations = Normal::new(params.drift, params.volatility)
            .map_err(|e| LongevityError::Numerical(format!("innovation distribution: {}", e)))?;
        debug!(
            "kt random walk: drift={:.6} volatility={:.6}",
            params.drift, params.volatility
        );

        let seed = match self.config.seed {
            Some(s) => s,
            None => {
                let s = rand::random::<u64>();
                info!("No seed configured; drew master seed {}", s);
                s
            }
        };

        // kt paths: one contiguous block of `horizon` values per simulation
        let last_kt = self.model.last_kt();
        let mut kt_data = vec![0.0; horizon * simulations];
        kt_data
            .par_chunks_mut(horizon)
            .enumerate()
            .for_each(|(sim, path)| {
                let mut rng = StdRng::seed_from_u64(stream_seed(seed, sim as u64));
                let mut level = last_kt;
                for slot in path.iter_mut() {
                    level += innovations.sample(&mut rng);
                    *slot = level;
                }
            });

        // ln m = ax + bx * kt for every (age, year) of every simulation
        let mut rates = vec![0.0; n_ages * horizon * simulations];
        rates
            .par_chunks_mut(n_ages * horizon)
            .zip(kt_data.par_chunks(horizon))
            .for_each(|(block, path)| {
                for (year, &kt) in path.iter().enumerate() {
                    let cells = &mut block[year * n_ages..(year + 1) * n_ages];
                    for (age, cell) in cells.iter_mut().enumerate() {
                        *cell = self.model.log_rate(age, kt).exp();
                    }
                }
            });

        let surface = ForecastSurface::from_parts(n_ages, horizon, simulations, rates)?;
        // Column-major: column `sim` is that simulation's path
        let kt_forecasts = DMatrix::from_vec(horizon, simulations, kt_data);

        info!(
            "Forecast {} simulations x {} years over {} ages (seed {})",
            simulations, horizon, n_ages, seed
        );

        Ok(MortalityForecast {
            kt_forecasts,
            surface,
            params,
            seed,
        })
    }
}
