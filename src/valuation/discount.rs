//! Yield curves and discounting
//!
//! Supports:
//! - Flat curves
//! - Linearly sloping curves (rate rising from a start to an end rate over N years)
//! - Arbitrary spot curves supplied by the caller

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{LongevityError, Result};

/// Per-period annual spot rates, one per valuation year (year 0 first)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldCurve {
    rates: Vec<f64>,
}

impl YieldCurve {
    /// Create from spot rates; each must be finite and > -1
    pub fn new(rates: Vec<f64>) -> Result<Self> {
        if let Some((t, r)) = rates
            .iter()
            .enumerate()
            .find(|(_, r)| !r.is_finite() || **r <= -1.0)
        {
            return Err(LongevityError::InvalidInput(format!(
                "spot rate {} at period {} must be finite and greater than -1",
                r, t
            )));
        }
        Ok(Self { rates })
    }

    /// Flat curve at `rate` for `len` periods
    pub fn flat(rate: f64, len: usize) -> Result<Self> {
        Self::new(vec![rate; len])
    }

    /// Curve rising linearly: `start + (end - start) * t / years`
    ///
    /// Not capped at `end`: periods beyond `years` keep extrapolating the slope.
    pub fn sloping(start_rate: f64, end_rate: f64, years: f64, len: usize) -> Result<Self> {
        if years <= 0.0 {
            return Err(LongevityError::InvalidInput(format!(
                "slope period must be positive, got {}",
                years
            )));
        }
        let slope = (end_rate - start_rate) / years;
        Self::new((0..len).map(|t| start_rate + slope * t as f64).collect())
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Discount factor for period `t`: `1 / (1 + r_t)^t`
    pub fn discount_factor(&self, t: usize) -> f64 {
        1.0 / (1.0 + self.rates[t]).powi(t as i32)
    }

    /// Discount factors for every period
    pub fn discount_factors(&self) -> Vec<f64> {
        (0..self.rates.len()).map(|t| self.discount_factor(t)).collect()
    }
}

/// How to build the valuation curve once the horizon is known
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum YieldCurveSpec {
    Flat { rate: f64 },
    Sloping { start_rate: f64, end_rate: f64, years: f64 },
    Spot { rates: Vec<f64> },
}

impl Default for YieldCurveSpec {
    /// Upward sloping: 3% rising to 5% over 30 years
    fn default() -> Self {
        YieldCurveSpec::Sloping {
            start_rate: 0.03,
            end_rate: 0.05,
            years: 30.0,
        }
    }
}

impl YieldCurveSpec {
    /// Build a curve with exactly `len` periods
    pub fn build(&self, len: usize) -> Result<YieldCurve> {
        match self {
            YieldCurveSpec::Flat { rate } => YieldCurve::flat(*rate, len),
            YieldCurveSpec::Sloping {
                start_rate,
                end_rate,
                years,
            } => YieldCurve::sloping(*start_rate, *end_rate, *years, len),
            YieldCurveSpec::Spot { rates } => {
                if rates.len() < len {
                    return Err(LongevityError::dimension("spot curve periods", len, rates.len()));
                }
                YieldCurve::new(rates[..len].to_vec())
            }
        }
    }
}

/// Discounted sum down each column: `sum_t values[t, s] * factors[t]`
///
/// Columns are independent and summed in parallel.
pub fn discounted_column_sums(values: &DMatrix<f64>, factors: &[f64]) -> Result<Vec<f64>> {
    let rows = values.nrows();
    if factors.len() != rows {
        return Err(LongevityError::dimension(
            "discount factors vs cashflow periods",
            rows,
            factors.len(),
        ));
    }
    if rows == 0 {
        return Ok(vec![0.0; values.ncols()]);
    }

    Ok(values
        .as_slice()
        .par_chunks(rows)
        .map(|column| column.iter().zip(factors).map(|(v, df)| v * df).sum::<f64>())
        .collect())
}
