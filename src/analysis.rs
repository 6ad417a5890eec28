//! End-to-end longevity analysis
//!
//! Runs every stage on one mortality matrix:
//! fit -> forecast -> survival -> liability valuation -> swap -> risk.
//! All stages share the same simulated paths, so the hedged and unhedged
//! distributions are directly comparable simulation by simulation.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{LongevityError, Result};
use crate::forecast::{
    ForecastConfig, MortalityForecast, RandomWalkParams, StochasticForecaster, DEFAULT_HORIZON,
    DEFAULT_SIMULATIONS,
};
use crate::mortality::{
    FittedMortalityModel, LeeCarterModel, LogMortalityMatrix, MortalityTableLoader, Sex,
};
use crate::risk::{calculate_risk_metrics, HedgeEffectiveness, RiskMetrics};
use crate::stats::{histogram, HistogramBin};
use crate::survival::{simulate_survival_paths, SurvivalPathMatrix};
use crate::swap::{LongevitySwapPricer, SwapLegResult, DEFAULT_LAMBDA};
use crate::valuation::{PensionLiability, YieldCurve, YieldCurveSpec};

/// Bins used for the PV distribution histograms in the summary
pub const HISTOGRAM_BINS: usize = 50;

fn default_years_to_forecast() -> usize { DEFAULT_HORIZON }
fn default_simulations() -> usize { DEFAULT_SIMULATIONS }
fn default_lambda() -> f64 { DEFAULT_LAMBDA }
fn default_initial_age() -> u32 { 65 }
fn default_initial_count() -> f64 { 1000.0 }
fn default_annual_pension() -> f64 { 10_000.0 }
fn default_max_age() -> u32 { 95 }

/// Configuration for a full analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_years_to_forecast")]
    pub years_to_forecast: usize,

    #[serde(default = "default_simulations")]
    pub simulations: usize,

    /// Market price of longevity risk
    #[serde(default = "default_lambda")]
    pub lambda: f64,

    #[serde(default = "default_initial_age")]
    pub initial_age: u32,

    #[serde(default = "default_initial_count")]
    pub initial_count: f64,

    #[serde(default = "default_annual_pension")]
    pub annual_pension: f64,

    /// Row of the cohort in the mortality matrix; looked up from `initial_age` when None
    #[serde(default)]
    pub start_age_index: Option<usize>,

    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub yield_curve: YieldCurveSpec,

    // Ingestion bounds
    #[serde(default)]
    pub min_age: u32,

    #[serde(default = "default_max_age")]
    pub max_age: u32,

    #[serde(default)]
    pub sex: Sex,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            years_to_forecast: default_years_to_forecast(),
            simulations: default_simulations(),
            lambda: default_lambda(),
            initial_age: default_initial_age(),
            initial_count: default_initial_count(),
            annual_pension: default_annual_pension(),
            start_age_index: None,
            seed: None,
            yield_curve: YieldCurveSpec::default(),
            min_age: 0,
            max_age: default_max_age(),
            sex: Sex::Total,
        }
    }
}

impl AnalysisConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LongevityError::InvalidInput(format!("analysis config: {}", e)))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Loader matching the configured age band and sex
    pub fn loader(&self) -> MortalityTableLoader {
        MortalityTableLoader::new(self.min_age, self.max_age, self.sex)
    }

    pub fn forecast_config(&self) -> ForecastConfig {
        ForecastConfig {
            horizon: self.years_to_forecast,
            simulations: self.simulations,
            seed: self.seed,
        }
    }

    pub fn liability(&self) -> Result<PensionLiability> {
        PensionLiability::new(self.initial_age, self.initial_count, self.annual_pension)
    }
}

/// Every artefact produced by an analysis run
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub model: FittedMortalityModel,
    pub forecast: MortalityForecast,
    pub start_age_index: usize,
    pub survival: SurvivalPathMatrix,
    pub cashflows: DMatrix<f64>,
    pub curve: YieldCurve,
    pub unhedged_pvs: Vec<f64>,
    pub swap: SwapLegResult,
    pub hedged_pvs: Vec<f64>,
    pub risk_metrics: BTreeMap<String, RiskMetrics>,
    pub effectiveness: HedgeEffectiveness,
}

impl AnalysisResult {
    /// Effective survival horizon (may be shorter than the forecast)
    pub fn horizon(&self) -> usize {
        self.survival.horizon()
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            seed: self.forecast.seed(),
            simulations: self.survival.simulations(),
            horizon: self.horizon(),
            start_age: self.model.ages()[self.start_age_index],
            explained_variance: self.model.explained_variance(),
            random_walk: self.forecast.params(),
            lambda: self.swap.lambda,
            fixed_leg_pv: self.swap.fixed_leg_pv,
            risk_metrics: self.risk_metrics.clone(),
            effectiveness: self.effectiveness.clone(),
            unhedged_histogram: histogram(&self.unhedged_pvs, HISTOGRAM_BINS),
            hedged_histogram: histogram(&self.hedged_pvs, HISTOGRAM_BINS),
        }
    }
}

/// Serializable headline figures of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub seed: u64,
    pub simulations: usize,
    pub horizon: usize,
    pub start_age: u32,
    pub explained_variance: f64,
    pub random_walk: RandomWalkParams,
    pub lambda: f64,
    pub fixed_leg_pv: f64,
    pub risk_metrics: BTreeMap<String, RiskMetrics>,
    pub effectiveness: HedgeEffectiveness,
    pub unhedged_histogram: Vec<HistogramBin>,
    pub hedged_histogram: Vec<HistogramBin>,
}

/// Runs the full pipeline for one configuration
pub struct LongevityAnalysis {
    config: AnalysisConfig,
}

impl LongevityAnalysis {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Fit a Lee-Carter model to the matrix, then run every later stage
    pub fn run(&self, matrix: &LogMortalityMatrix) -> Result<AnalysisResult> {
        let model = LeeCarterModel::new().fit(matrix)?;
        self.run_with_model(model)
    }

    /// Run from an already fitted model
    pub fn run_with_model(&self, model: FittedMortalityModel) -> Result<AnalysisResult> {
        let liability = self.config.liability()?;
        let start_age_index = match self.config.start_age_index {
            Some(idx) => idx,
            None => liability.start_age_index(model.ages())?,
        };

        let forecast = StochasticForecaster::new(&model, self.config.forecast_config())?.predict()?;
        let survival = simulate_survival_paths(forecast.surface(), start_age_index)?;

        let cashflows = liability.project_cashflows(&survival);
        let curve = self.config.yield_curve.build(survival.rows())?;
        let unhedged_pvs = PensionLiability::present_value(&cashflows, &curve)?;

        let pricer = LongevitySwapPricer::new(self.config.lambda)?;
        let swap = pricer.price_legs(
            &survival,
            &curve,
            liability.initial_count,
            liability.annual_pension,
        )?;
        let hedged_pvs = swap.hedged_present_values(&unhedged_pvs)?;

        let risk_metrics = calculate_risk_metrics(&unhedged_pvs, &hedged_pvs)?;
        let effectiveness = HedgeEffectiveness::new(&unhedged_pvs, &hedged_pvs);

        info!(
            "Analysis complete: {} simulations, horizon {}, variance reduction {:.2}%",
            survival.simulations(),
            survival.horizon(),
            effectiveness.variance_reduction * 100.0
        );

        Ok(AnalysisResult {
            model,
            forecast,
            start_age_index,
            survival,
            cashflows,
            curve,
            unhedged_pvs,
            swap,
            hedged_pvs,
            risk_metrics,
            effectiveness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{HEDGED, UNHEDGED};
    use crate::swap::WangTransform;
    use approx::assert_relative_eq;

    fn flat_matrix() -> LogMortalityMatrix {
        LogMortalityMatrix::from_rows(
            vec![0, 1],
            (2000..2005).collect(),
            &[vec![-3.0; 5], vec![-3.0; 5]],
        )
        .unwrap()
    }

    /// Ages 60-80 with mortality improving at a noisy, age-dependent pace
    fn trending_matrix() -> LogMortalityMatrix {
        let ages: Vec<u32> = (60..=80).collect();
        let years: Vec<u32> = (1990..2010).collect();
        let rows: Vec<Vec<f64>> = ages
            .iter()
            .map(|&age| {
                (0..years.len())
                    .map(|t| {
                        let wobble = ((t * 37 % 11) as f64 - 5.0) * 0.004;
                        -9.5 + 0.09 * age as f64 - (0.015 + 0.0002 * (80 - age) as f64) * t as f64 + wobble
                    })
                    .collect()
            })
            .collect();
        LogMortalityMatrix::from_rows(ages, years, &rows).unwrap()
    }

    fn small_config(seed: u64) -> AnalysisConfig {
        AnalysisConfig {
            years_to_forecast: 15,
            simulations: 400,
            seed: Some(seed),
            yield_curve: YieldCurveSpec::Flat { rate: 0.03 },
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_flat_matrix_end_to_end() {
        for lambda in [0.0, 0.2, 0.5] {
            let config = AnalysisConfig {
                years_to_forecast: 10,
                simulations: 50,
                lambda,
                start_age_index: Some(0),
                seed: Some(7),
                yield_curve: YieldCurveSpec::Flat { rate: 0.04 },
                ..AnalysisConfig::default()
            };
            let result = LongevityAnalysis::new(config).run(&flat_matrix()).unwrap();

            // Two ages leave a single year of survival
            assert_eq!(result.horizon(), 1);

            let p1 = (-(-3.0f64).exp()).exp();
            for sim in 0..50 {
                assert_relative_eq!(result.survival.get(1, sim), p1, max_relative = 1e-12);
            }

            // Deterministic paths: the liability carries no risk
            let unhedged = &result.risk_metrics[UNHEDGED];
            assert!(unhedged.std_dev < 1e-6 * result.unhedged_pvs[0]);

            // Fixed leg: risk-neutral constant-survival annuity
            let wang = WangTransform::new(lambda).unwrap();
            let notional = 1000.0 * 10_000.0;
            let expected = notional * (wang.apply(1.0) + wang.apply(p1) / 1.04);
            assert_relative_eq!(result.swap.fixed_leg_pv, expected, max_relative = 1e-12);

            for pv in &result.hedged_pvs {
                assert_relative_eq!(*pv, result.swap.fixed_leg_pv, max_relative = 1e-12);
            }
            assert_eq!(result.summary().lambda, lambda);
        }
    }

    #[test]
    fn test_hedge_does_not_increase_dispersion() {
        let result = LongevityAnalysis::new(small_config(11))
            .run(&trending_matrix())
            .unwrap();

        let unhedged = result.risk_metrics[UNHEDGED];
        let hedged = result.risk_metrics[HEDGED];
        assert!(unhedged.std_dev > 0.0);
        assert!(hedged.std_dev <= unhedged.std_dev);
        assert!(result.effectiveness.variance_reduction > 0.99);
        assert!(unhedged.es_95 >= unhedged.var_95);
    }

    #[test]
    fn test_zero_lambda_fixed_leg_matches_mean_floating_leg() {
        let config = AnalysisConfig {
            lambda: 0.0,
            ..small_config(3)
        };
        let result = LongevityAnalysis::new(config).run(&trending_matrix()).unwrap();

        let n = result.swap.floating_leg_pvs.len() as f64;
        let mean_floating = result.swap.floating_leg_pvs.iter().sum::<f64>() / n;
        assert_relative_eq!(result.swap.fixed_leg_pv, mean_floating, max_relative = 1e-6);
    }

    #[test]
    fn test_same_seed_same_result() {
        let matrix = trending_matrix();
        let a = LongevityAnalysis::new(small_config(99)).run(&matrix).unwrap();
        let b = LongevityAnalysis::new(small_config(99)).run(&matrix).unwrap();
        assert_eq!(a.unhedged_pvs, b.unhedged_pvs);
        assert_eq!(a.swap.fixed_leg_pv, b.swap.fixed_leg_pv);

        let c = LongevityAnalysis::new(small_config(100)).run(&matrix).unwrap();
        assert_ne!(a.unhedged_pvs, c.unhedged_pvs);
    }

    #[test]
    fn test_start_age_from_initial_age() {
        let result = LongevityAnalysis::new(small_config(5))
            .run(&trending_matrix())
            .unwrap();
        // Age 65 is row 5 of 60..=80; 15 rows remain above it
        assert_eq!(result.start_age_index, 5);
        assert_eq!(result.horizon(), 15);
        assert_eq!(result.curve.len(), 16);

        let summary = result.summary();
        assert_eq!(summary.start_age, 65);
        assert_eq!(summary.seed, 5);
        assert_eq!(summary.lambda, DEFAULT_LAMBDA);
    }

    #[test]
    fn test_initial_age_outside_table() {
        let config = AnalysisConfig {
            initial_age: 90,
            ..small_config(1)
        };
        let result = LongevityAnalysis::new(config).run(&trending_matrix());
        assert!(matches!(result, Err(LongevityError::InvalidInput(_))));
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config = AnalysisConfig::from_json_str(
            r#"{"simulations": 100, "yield_curve": {"type": "Flat", "rate": 0.02}}"#,
        )
        .unwrap();
        assert_eq!(config.simulations, 100);
        assert_eq!(config.years_to_forecast, 40);
        assert_eq!(config.initial_age, 65);
        assert_relative_eq!(config.lambda, 0.20);
        assert!(config.seed.is_none());
        assert!(matches!(config.yield_curve, YieldCurveSpec::Flat { .. }));

        assert!(AnalysisConfig::from_json_str("{ not json").is_err());
    }
}
