//! Longevity Engine - stochastic mortality forecasting and longevity hedging
//!
//! This library provides:
//! - Lee-Carter model fitting on log mortality matrices (HMD ingestion included)
//! - Monte Carlo forecasts of the mortality index as a random walk with drift
//! - Cohort survival paths and pension liability present values
//! - Longevity swap pricing with the Wang transform
//! - VaR / Expected Shortfall comparison of hedged and unhedged positions

pub mod error;
pub mod stats;
pub mod mortality;
pub mod forecast;
pub mod survival;
pub mod valuation;
pub mod swap;
pub mod risk;
pub mod analysis;

// Re-export commonly used types
pub use error::{LongevityError, Result};
pub use mortality::{FittedMortalityModel, LeeCarterModel, LogMortalityMatrix, MortalityTableLoader, Sex};
pub use forecast::{ForecastConfig, ForecastSurface, MortalityForecast, StochasticForecaster};
pub use survival::{simulate_survival_paths, SurvivalPathMatrix};
pub use valuation::{PensionLiability, YieldCurve, YieldCurveSpec};
pub use swap::{wang_transform, LongevitySwapPricer, SwapLegResult};
pub use risk::{calculate_risk_metrics, HedgeEffectiveness, RiskMetrics};
pub use analysis::{AnalysisConfig, AnalysisResult, LongevityAnalysis};
