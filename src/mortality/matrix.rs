//! Age x year log-mortality surface

use nalgebra::DMatrix;

use crate::error::{LongevityError, Result};

/// Log central death rates indexed by age (rows) and calendar year (columns)
///
/// Ages are strictly ascending; years are ascending and contiguous.
/// Finiteness is checked by the fit, not here, so that a matrix with gaps can
/// still be inspected.
#[derive(Debug, Clone)]
pub struct LogMortalityMatrix {
    values: DMatrix<f64>,
    ages: Vec<u32>,
    years: Vec<u32>,
}

impl LogMortalityMatrix {
    /// Create from labels and a dense matrix
    pub fn new(ages: Vec<u32>, years: Vec<u32>, values: DMatrix<f64>) -> Result<Self> {
        if ages.is_empty() {
            return Err(LongevityError::InvalidInput(
                "log-mortality matrix needs at least one age row".into(),
            ));
        }
        if values.nrows() != ages.len() {
            return Err(LongevityError::dimension("matrix rows vs ages", ages.len(), values.nrows()));
        }
        if values.ncols() != years.len() {
            return Err(LongevityError::dimension("matrix columns vs years", years.len(), values.ncols()));
        }
        if ages.windows(2).any(|w| w[1] <= w[0]) {
            return Err(LongevityError::InvalidInput("ages must be strictly ascending".into()));
        }
        if years.windows(2).any(|w| w[1] != w[0] + 1) {
            return Err(LongevityError::InvalidInput(
                "years must be ascending and contiguous".into(),
            ));
        }

        Ok(Self { values, ages, years })
    }

    /// Create from one `Vec` per age row
    pub fn from_rows(ages: Vec<u32>, years: Vec<u32>, rows: &[Vec<f64>]) -> Result<Self> {
        if rows.len() != ages.len() {
            return Err(LongevityError::dimension("rows vs ages", ages.len(), rows.len()));
        }
        if let Some(bad) = rows.iter().find(|r| r.len() != years.len()) {
            return Err(LongevityError::dimension("row length vs years", years.len(), bad.len()));
        }

        let values = DMatrix::from_fn(ages.len(), years.len(), |i, j| rows[i][j]);
        Self::new(ages, years, values)
    }

    /// Create from central death rates (not logged); rates must be positive
    pub fn from_rates(ages: Vec<u32>, years: Vec<u32>, rates: &[Vec<f64>]) -> Result<Self> {
        let logged: Vec<Vec<f64>> = rates
            .iter()
            .map(|row| row.iter().map(|m| m.ln()).collect())
            .collect();
        Self::from_rows(ages, years, &logged)
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    pub fn ages(&self) -> &[u32] {
        &self.ages
    }

    pub fn years(&self) -> &[u32] {
        &self.years
    }

    pub fn n_ages(&self) -> usize {
        self.ages.len()
    }

    pub fn n_years(&self) -> usize {
        self.years.len()
    }

    /// Row index of an age label
    pub fn age_index(&self, age: u32) -> Option<usize> {
        self.ages.iter().position(|&a| a == age)
    }

    /// First non-finite cell as (age, year), if any
    pub fn first_non_finite(&self) -> Option<(u32, u32)> {
        for i in 0..self.n_ages() {
            for j in 0..self.n_years() {
                if !self.values[(i, j)].is_finite() {
                    return Some((self.ages[i], self.years[j]));
                }
            }
        }
        None
    }
}
