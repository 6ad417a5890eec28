//! Cohort survival paths from a forecast mortality surface
//!
//! A cohort starting at age row `start_age_index` ages one year per forecast
//! year, so year `t` reads the diagonal cell `(start_age_index + t, t)`. The
//! central death rate is converted to an annual death probability assuming a
//! constant force of mortality over the year: `q = 1 - exp(-m)`.

use log::{info, warn};
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::error::{LongevityError, Result};
use crate::forecast::ForecastSurface;
use crate::stats;

/// Annual death probability from a central death rate (constant force)
#[inline]
pub fn death_probability(central_rate: f64) -> f64 {
    1.0 - (-central_rate).exp()
}

/// Cumulative survival probabilities, (horizon + 1) x simulations
///
/// Row 0 is 1.0 for every simulation; each column is non-increasing and
/// bounded in [0, 1].
#[derive(Debug, Clone)]
pub struct SurvivalPathMatrix {
    paths: DMatrix<f64>,
}

impl SurvivalPathMatrix {
    /// Wrap externally produced survival paths after validating them
    pub fn new(paths: DMatrix<f64>) -> Result<Self> {
        if paths.nrows() == 0 || paths.ncols() == 0 {
            return Err(LongevityError::InvalidInput("survival path matrix is empty".into()));
        }
        for (s, column) in paths.column_iter().enumerate() {
            if let Some(p) = column.iter().find(|p| !(0.0..=1.0).contains(*p)) {
                return Err(LongevityError::InvalidInput(format!(
                    "survival probability {} outside [0, 1] in simulation {}",
                    p, s
                )));
            }
        }
        Ok(Self { paths })
    }

    /// Number of projected years (rows - 1)
    pub fn horizon(&self) -> usize {
        self.paths.nrows() - 1
    }

    pub fn rows(&self) -> usize {
        self.paths.nrows()
    }

    pub fn simulations(&self) -> usize {
        self.paths.ncols()
    }

    /// Survival probability to year `t` in simulation `sim`
    pub fn get(&self, t: usize, sim: usize) -> f64 {
        self.paths[(t, sim)]
    }

    /// One simulation's survival path
    pub fn path(&self, sim: usize) -> &[f64] {
        let rows = self.paths.nrows();
        &self.paths.as_slice()[sim * rows..(sim + 1) * rows]
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.paths
    }

    /// Best-estimate survival curve: mean over simulations for each year
    pub fn mean_path(&self) -> Vec<f64> {
        (0..self.paths.nrows())
            .map(|t| {
                let row: Vec<f64> = self.paths.row(t).iter().copied().collect();
                stats::mean(&row)
            })
            .collect()
    }
}

/// Simulate one survival path per simulation for a cohort starting at
/// `start_age_index`
///
/// The horizon is `min(forecast years, ages - start_age_index - 1)`; when the
/// cohort would run off the top of the age range the matrix is shorter than the
/// forecast, so callers should read `SurvivalPathMatrix::horizon()`.
pub fn simulate_survival_paths(
    surface: &ForecastSurface,
    start_age_index: usize,
) -> Result<SurvivalPathMatrix> {
    let (n_ages, forecast_years, simulations) = surface.shape();
    if start_age_index >= n_ages {
        return Err(LongevityError::dimension(
            "start age index (number of age rows)",
            n_ages,
            start_age_index,
        ));
    }

    let horizon = forecast_years.min(n_ages - start_age_index - 1);
    if horizon < forecast_years {
        warn!(
            "Survival horizon truncated to {} of {} forecast years: cohort reaches the oldest age row",
            horizon, forecast_years
        );
    }

    let rows = horizon + 1;
    let mut data = vec![1.0; rows * simulations];
    data.par_chunks_mut(rows).enumerate().for_each(|(sim, path)| {
        let mut survival = 1.0;
        for t in 0..horizon {
            let q = death_probability(surface.rate(start_age_index + t, t, sim));
            survival *= 1.0 - q;
            path[t + 1] = survival;
        }
    });

    info!(
        "Simulated {} survival paths over {} years from age row {}",
        simulations, horizon, start_age_index
    );

    Ok(SurvivalPathMatrix {
        paths: DMatrix::from_vec(rows, simulations, data),
    })
}
