//! Lee-Carter fit: ln(m[x,t]) = a[x] + b[x] * k[t]
//!
//! The fit is a single operation returning an immutable `FittedMortalityModel`:
//! 1. `a[x]` is the row mean of the log surface over years
//! 2. the surface is centred by `a[x]`
//! 3. the leading singular triple of the centred surface gives `b[x]` (left vector)
//!    and `k[t]` (singular value times right vector)
//! 4. sign and scale are fixed by `sum(b) = 1`, rescaling `k` so `b[x] * k[t]` is unchanged

use log::{debug, info, warn};
use nalgebra::DMatrix;
use serde::Serialize;

use super::matrix::LogMortalityMatrix;
use crate::error::{LongevityError, Result};

/// Centred surfaces with no cell larger than this have no time variation
const NO_VARIATION_TOLERANCE: f64 = 1e-12;

/// |sum(b_raw)| below this leaves the sign/scale of b undetermined
const MIN_NORMALIZATION_SCALE: f64 = 1e-10;

/// Largest accepted |U S V^T - centred|, relative to the surface's largest cell
const RECOMPOSE_TOLERANCE: f64 = 1e-8;

/// Fitted Lee-Carter parameters
///
/// Invariants established by `LeeCarterModel::fit`:
/// - `ax[i]` is exactly the mean of row `i` of the fitted matrix
/// - `sum(bx) = 1`
/// - `bx[i] * kt[t]` is the rank-1 approximation of the centred matrix
#[derive(Debug, Clone, Serialize)]
pub struct FittedMortalityModel {
    ax: Vec<f64>,
    bx: Vec<f64>,
    kt: Vec<f64>,
    ages: Vec<u32>,
    years: Vec<u32>,
    explained_variance: f64,
}

impl FittedMortalityModel {
    /// Age-specific average log mortality
    pub fn ax(&self) -> &[f64] {
        &self.ax
    }

    /// Age sensitivity to the time index
    pub fn bx(&self) -> &[f64] {
        &self.bx
    }

    /// Historical time index, one value per fitted year
    pub fn kt(&self) -> &[f64] {
        &self.kt
    }

    pub fn ages(&self) -> &[u32] {
        &self.ages
    }

    pub fn years(&self) -> &[u32] {
        &self.years
    }

    pub fn n_ages(&self) -> usize {
        self.ax.len()
    }

    /// Share of the centred surface's variance captured by the first component
    pub fn explained_variance(&self) -> f64 {
        self.explained_variance
    }

    /// Most recent fitted value of the time index
    pub fn last_kt(&self) -> f64 {
        // kt has at least two entries by construction
        self.kt[self.kt.len() - 1]
    }

    /// Log mortality for age row `age_idx` at time-index level `kt`
    #[inline]
    pub fn log_rate(&self, age_idx: usize, kt: f64) -> f64 {
        self.ax[age_idx] + self.bx[age_idx] * kt
    }

    /// Rank-1 reconstruction `ax[i] + bx[i] * kt[t]` over the fitted years
    pub fn fitted_log_mortality(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.ax.len(), self.kt.len(), |i, t| self.log_rate(i, self.kt[t]))
    }
}

/// Lee-Carter fitter
///
/// Carries the SVD convergence settings; the fitted parameters live in
/// `FittedMortalityModel`.
#[derive(Debug, Clone, Copy)]
pub struct LeeCarterModel {
    /// Convergence tolerance for the SVD iteration
    pub svd_epsilon: f64,

    /// Maximum SVD iterations before reporting non-convergence; 0 runs
    /// until convergence
    pub max_svd_iterations: usize,
}

impl Default for LeeCarterModel {
    fn default() -> Self {
        Self {
            svd_epsilon: f64::EPSILON,
            max_svd_iterations: 0,
        }
    }
}

impl LeeCarterModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the model to a historical log-mortality surface
    ///
    /// # Errors
    /// * `InvalidInput` - fewer than 2 years, or a non-finite cell
    /// * `Numerical` - SVD did not converge or does not reproduce the centred
    ///   surface, or `sum(b)` is ~0
    pub fn fit(&self, matrix: &LogMortalityMatrix) -> Result<FittedMortalityModel> {
        let n_ages = matrix.n_ages();
        let n_years = matrix.n_years();

        if n_years < 2 {
            return Err(LongevityError::InvalidInput(format!(
                "need at least 2 historical years to fit, got {}",
                n_years
            )));
        }
        if let Some((age, year)) = matrix.first_non_finite() {
            return Err(LongevityError::InvalidInput(format!(
                "non-finite log mortality at age {} year {}",
                age, year
            )));
        }

        let values = matrix.values();

        // 1. ax: row means
        let ax: Vec<f64> = (0..n_ages)
            .map(|i| values.row(i).iter().sum::<f64>() / n_years as f64)
            .collect();

        // 2. Centre each age row
        let centered = DMatrix::from_fn(n_ages, n_years, |i, t| values[(i, t)] - ax[i]);

        if centered.amax() <= NO_VARIATION_TOLERANCE {
            // No variation over time: every age row is constant
            warn!("Log-mortality surface has no time variation; using uniform bx and zero kt");
            return Ok(FittedMortalityModel {
                ax,
                bx: vec![1.0 / n_ages as f64; n_ages],
                kt: vec![0.0; n_years],
                ages: matrix.ages().to_vec(),
                years: matrix.years().to_vec(),
                explained_variance: 1.0,
            });
        }

        // 3. Leading singular triple, decomposing the tall orientation
        let transposed = n_ages < n_years;
        let target = if transposed { centered.transpose() } else { centered };
        let svd = target
            .clone()
            .try_svd(true, true, self.svd_epsilon, self.max_svd_iterations)
            .ok_or_else(|| LongevityError::Numerical("SVD did not converge".into()))?;
        let u = svd
            .u
            .as_ref()
            .ok_or_else(|| LongevityError::Numerical("SVD returned no left vectors".into()))?;
        let v_t = svd
            .v_t
            .as_ref()
            .ok_or_else(|| LongevityError::Numerical("SVD returned no right vectors".into()))?;

        let rebuilt = u * DMatrix::from_diagonal(&svd.singular_values) * v_t;
        let recompose_error = (&rebuilt - &target).amax();
        if !(recompose_error <= RECOMPOSE_TOLERANCE * target.amax().max(1.0)) {
            return Err(LongevityError::Numerical(format!(
                "SVD does not reproduce the centred surface (max error {:e})",
                recompose_error
            )));
        }

        let (lead, sigma) = svd
            .singular_values
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (k, s)| if s > best.1 { (k, s) } else { best });
        if !sigma.is_finite() {
            return Err(LongevityError::Numerical(format!("leading singular value is {}", sigma)));
        }

        let total_energy: f64 = svd.singular_values.iter().map(|s| s * s).sum();

        // centred = U S V^T, or V S U^T when the transpose was decomposed
        let (bx_raw, kt_raw): (Vec<f64>, Vec<f64>) = if transposed {
            (
                v_t.row(lead).iter().copied().collect(),
                u.column(lead).iter().map(|v| v * sigma).collect(),
            )
        } else {
            (
                u.column(lead).iter().copied().collect(),
                v_t.row(lead).iter().map(|v| v * sigma).collect(),
            )
        };

        // 4. Normalise: sum(bx) = 1
        let scale: f64 = bx_raw.iter().sum();
        if scale.abs() < MIN_NORMALIZATION_SCALE || !scale.is_finite() {
            return Err(LongevityError::Numerical(format!(
                "bx sums to {:e}; sign/scale of the age profile is indeterminate",
                scale
            )));
        }
        debug!("Lee-Carter normalisation scale factor: {:.6}", scale);

        let bx: Vec<f64> = bx_raw.iter().map(|b| b / scale).collect();
        let kt: Vec<f64> = kt_raw.iter().map(|k| k * scale).collect();

        let explained_variance = if total_energy > 0.0 {
            sigma * sigma / total_energy
        } else {
            1.0
        };

        info!(
            "Fitted Lee-Carter model: {} ages x {} years, first component explains {:.2}% of variance",
            n_ages,
            n_years,
            explained_variance * 100.0
        );

        Ok(FittedMortalityModel {
            ax,
            bx,
            kt,
            ages: matrix.ages().to_vec(),
            years: matrix.years().to_vec(),
            explained_variance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Exact rank-1 Lee-Carter surface with known parameters
    fn rank_one_surface() -> (Vec<f64>, Vec<f64>, Vec<f64>, LogMortalityMatrix) {
        let a = vec![-5.0, -4.0, -3.0, -2.0];
        let b = vec![0.1, 0.2, 0.3, 0.4];
        let k = vec![5.0, 3.0, 1.0, -1.0, -3.0, -5.0];
        let rows: Vec<Vec<f64>> = (0..a.len())
            .map(|i| k.iter().map(|kt| a[i] + b[i] * kt).collect())
            .collect();
        let matrix = LogMortalityMatrix::from_rows(
            vec![60, 61, 62, 63],
            (2000..2006).collect(),
            &rows,
        )
        .unwrap();
        (a, b, k, matrix)
    }

    /// Surface with a second, independent source of variation
    fn rank_two_surface() -> (Vec<Vec<f64>>, LogMortalityMatrix) {
        let rows: Vec<Vec<f64>> = (0..5)
            .map(|i| {
                (0..8)
                    .map(|t| {
                        let (x, y) = (i as f64, t as f64);
                        -6.0 + 0.8 * x - (0.02 + 0.01 * x) * y + 0.05 * (x - 2.0) * (y * 1.3).sin()
                    })
                    .collect()
            })
            .collect();
        let matrix =
            LogMortalityMatrix::from_rows((50..55).collect(), (1990..1998).collect(), &rows).unwrap();
        (rows, matrix)
    }

    #[test]
    fn test_ax_is_exact_row_mean() {
        let (rows, matrix) = rank_two_surface();
        let model = LeeCarterModel::new().fit(&matrix).unwrap();

        for (i, row) in rows.iter().enumerate() {
            let expected = row.iter().sum::<f64>() / row.len() as f64;
            assert_eq!(model.ax()[i], expected);
        }
    }

    #[test]
    fn test_bx_sums_to_one() {
        let (_, matrix) = rank_two_surface();
        let model = LeeCarterModel::new().fit(&matrix).unwrap();

        let sum: f64 = model.bx().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "sum(bx) = {}", sum);
    }

    #[test]
    fn test_recovers_known_parameters() {
        let (a, b, k, matrix) = rank_one_surface();
        let model = LeeCarterModel::new().fit(&matrix).unwrap();

        for i in 0..a.len() {
            assert_relative_eq!(model.ax()[i], a[i], epsilon = 1e-12);
            assert_relative_eq!(model.bx()[i], b[i], epsilon = 1e-9);
        }
        for t in 0..k.len() {
            assert_relative_eq!(model.kt()[t], k[t], epsilon = 1e-9);
        }
        assert_relative_eq!(model.explained_variance(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rank_one_surface_reconstructs_in_both_orientations() {
        let b = [0.1, 0.2, 0.3, 0.4];
        let k = [5.0, 3.0, 1.0, -1.0, -3.0, -5.0];

        // Wide: 4 ages x 6 years
        let wide: Vec<Vec<f64>> = b.iter().map(|bi| k.iter().map(|kt| -4.0 + bi * kt).collect()).collect();
        // Tall: 6 ages x 4 years
        let b_tall = [0.05, 0.1, 0.15, 0.2, 0.2, 0.3];
        let k_tall = [3.0, 1.0, -1.0, -3.0];
        let tall: Vec<Vec<f64>> = b_tall
            .iter()
            .map(|bi| k_tall.iter().map(|kt| -4.0 + bi * kt).collect())
            .collect();

        for (ages, years, rows) in [
            ((60..64).collect::<Vec<u32>>(), (2000..2006).collect::<Vec<u32>>(), wide),
            ((60..66).collect::<Vec<u32>>(), (2000..2004).collect::<Vec<u32>>(), tall),
        ] {
            let matrix = LogMortalityMatrix::from_rows(ages, years, &rows).unwrap();
            let model = LeeCarterModel::new().fit(&matrix).unwrap();
            let fitted = model.fitted_log_mortality();

            for (i, row) in rows.iter().enumerate() {
                for (t, &v) in row.iter().enumerate() {
                    assert_relative_eq!(fitted[(i, t)], v, epsilon = 1e-9);
                }
            }
        }

        let (_, _, k, matrix) = rank_one_surface();
        let model = LeeCarterModel::new().fit(&matrix).unwrap();
        assert_relative_eq!(model.kt()[0], k[0], epsilon = 1e-9);
        assert_relative_eq!(model.kt()[5], k[5], epsilon = 1e-9);
    }

    #[test]
    fn test_reconstruction_beats_mean_only() {
        let (rows, matrix) = rank_two_surface();
        let model = LeeCarterModel::new().fit(&matrix).unwrap();
        let fitted = model.fitted_log_mortality();

        let mut mse_rank1 = 0.0;
        let mut mse_mean = 0.0;
        for (i, row) in rows.iter().enumerate() {
            for (t, &v) in row.iter().enumerate() {
                mse_rank1 += (v - fitted[(i, t)]).powi(2);
                mse_mean += (v - model.ax()[i]).powi(2);
            }
        }

        assert!(mse_rank1 < mse_mean, "rank-1 {} vs mean-only {}", mse_rank1, mse_mean);
    }

    #[test]
    fn test_flat_surface_is_degenerate_but_valid() {
        let matrix =
            LogMortalityMatrix::from_rows(vec![0, 1], (2000..2005).collect(), &[vec![-3.0; 5], vec![-3.0; 5]])
                .unwrap();
        let model = LeeCarterModel::new().fit(&matrix).unwrap();

        assert_eq!(model.ax(), &[-3.0, -3.0]);
        assert_relative_eq!(model.bx()[0], model.bx()[1]);
        assert_relative_eq!(model.bx().iter().sum::<f64>(), 1.0);
        assert!(model.kt().iter().all(|k| k.abs() < 1e-12));
    }

    #[test]
    fn test_single_year_rejected() {
        let matrix = LogMortalityMatrix::from_rows(vec![60, 61], vec![2000], &[vec![-4.0], vec![-3.9]])
            .unwrap();
        let result = LeeCarterModel::new().fit(&matrix);
        assert!(matches!(result, Err(LongevityError::InvalidInput(_))));
    }

    #[test]
    fn test_non_finite_rejected() {
        let matrix = LogMortalityMatrix::from_rows(
            vec![60, 61],
            vec![2000, 2001],
            &[vec![-4.0, f64::NEG_INFINITY], vec![-3.9, -3.8]],
        )
        .unwrap();
        let result = LeeCarterModel::new().fit(&matrix);
        assert!(matches!(result, Err(LongevityError::InvalidInput(_))));
    }

    #[test]
    fn test_opposing_age_profile_is_indeterminate() {
        // b = (1, -1): the two ages move in opposite directions, sum(b_raw) = 0
        let k = [2.0, 1.0, -1.0, -2.0];
        let rows = vec![
            k.iter().map(|kt| -4.0 + kt).collect::<Vec<f64>>(),
            k.iter().map(|kt| -4.0 - kt).collect::<Vec<f64>>(),
        ];
        let matrix = LogMortalityMatrix::from_rows(vec![70, 71], (2000..2004).collect(), &rows).unwrap();
        let result = LeeCarterModel::new().fit(&matrix);
        assert!(matches!(result, Err(LongevityError::Numerical(_))));
    }
}
