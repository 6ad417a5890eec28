//! Pension liability: expected cashflows and present values per simulation

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::discount::{discounted_column_sums, YieldCurve};
use crate::error::{LongevityError, Result};
use crate::survival::SurvivalPathMatrix;

/// A closed cohort of pensioners receiving a level annual pension
///
/// Cashflows use expected survivors (`count * survival probability`) rather
/// than simulating individual deaths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PensionLiability {
    /// Age of the cohort at valuation
    pub initial_age: u32,

    /// Number of pensioners at valuation
    pub initial_count: f64,

    /// Annual pension per survivor
    pub annual_pension: f64,
}

impl PensionLiability {
    pub fn new(initial_age: u32, initial_count: f64, annual_pension: f64) -> Result<Self> {
        if !initial_count.is_finite() || initial_count < 0.0 {
            return Err(LongevityError::InvalidInput(format!(
                "initial count must be non-negative, got {}",
                initial_count
            )));
        }
        if !annual_pension.is_finite() || annual_pension < 0.0 {
            return Err(LongevityError::InvalidInput(format!(
                "annual pension must be non-negative, got {}",
                annual_pension
            )));
        }
        Ok(Self {
            initial_age,
            initial_count,
            annual_pension,
        })
    }

    /// Total annual payment if the whole cohort survives
    pub fn notional(&self) -> f64 {
        self.initial_count * self.annual_pension
    }

    /// Row of `initial_age` in a list of ascending ages
    pub fn start_age_index(&self, ages: &[u32]) -> Result<usize> {
        ages.iter().position(|&a| a == self.initial_age).ok_or_else(|| {
            LongevityError::InvalidInput(format!(
                "initial age {} is not in the mortality table's age range",
                self.initial_age
            ))
        })
    }

    /// Expected cashflows: `count * survival[t, s] * pension`
    pub fn project_cashflows(&self, survival: &SurvivalPathMatrix) -> DMatrix<f64> {
        survival.as_matrix() * self.notional()
    }

    /// Present value per simulation of a (periods x simulations) cashflow matrix
    ///
    /// The curve must have exactly one rate per cashflow period.
    pub fn present_value(cashflows: &DMatrix<f64>, curve: &YieldCurve) -> Result<Vec<f64>> {
        if curve.len() != cashflows.nrows() {
            return Err(LongevityError::dimension(
                "yield curve length vs cashflow periods",
                cashflows.nrows(),
                curve.len(),
            ));
        }
        discounted_column_sums(cashflows, &curve.discount_factors())
    }
}
