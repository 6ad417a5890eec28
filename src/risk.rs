//! Tail-risk statistics over simulated present values
//!
//! Values are costs, so the adverse tail is the upper tail:
//! - VaR 95: 95th percentile of the cost distribution
//! - ES 95: mean of all outcomes at or above VaR 95
//! - StdDev: population standard deviation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LongevityError, Result};
use crate::stats;

/// Confidence level used for VaR and ES
pub const CONFIDENCE_LEVEL: f64 = 0.95;

pub const UNHEDGED: &str = "Unhedged";
pub const HEDGED: &str = "Hedged";

/// Tail statistics of one simulated cost distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    #[serde(rename = "VaR_95")]
    pub var_95: f64,
    #[serde(rename = "ES_95")]
    pub es_95: f64,
    #[serde(rename = "StdDev")]
    pub std_dev: f64,
}

impl RiskMetrics {
    /// Compute metrics at the 95% level
    pub fn from_present_values(values: &[f64]) -> Result<Self> {
        Self::at_confidence(values, CONFIDENCE_LEVEL)
    }

    /// Compute metrics at an arbitrary confidence level in (0, 1)
    pub fn at_confidence(values: &[f64], confidence: f64) -> Result<Self> {
        if values.is_empty() {
            return Err(LongevityError::InvalidInput(
                "cannot compute risk metrics of an empty distribution".into(),
            ));
        }
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(LongevityError::InvalidInput(format!(
                "confidence level must be in (0, 1), got {}",
                confidence
            )));
        }
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(LongevityError::InvalidInput(format!(
                "non-finite present value {}",
                v
            )));
        }

        let sorted = stats::sorted_copy(values);
        let var = stats::percentile_sorted(&sorted, confidence * 100.0);

        // Interpolated VaR never exceeds the maximum, so the tail is non-empty
        let tail: Vec<f64> = sorted.iter().copied().filter(|&v| v >= var).collect();
        let es = stats::mean(&tail);

        Ok(Self {
            var_95: var,
            es_95: es,
            std_dev: stats::population_std_dev(values),
        })
    }
}

/// Metrics for the unhedged and hedged distributions, keyed "Unhedged" / "Hedged"
pub fn calculate_risk_metrics(
    unhedged: &[f64],
    hedged: &[f64],
) -> Result<BTreeMap<String, RiskMetrics>> {
    let mut metrics = BTreeMap::new();
    metrics.insert(UNHEDGED.to_string(), RiskMetrics::from_present_values(unhedged)?);
    metrics.insert(HEDGED.to_string(), RiskMetrics::from_present_values(hedged)?);
    Ok(metrics)
}

/// Summary of how much of the liability's variability the hedge removes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeEffectiveness {
    pub mean_unhedged: f64,
    pub mean_hedged: f64,
    pub std_dev_unhedged: f64,
    pub std_dev_hedged: f64,

    /// 1 - Var(hedged) / Var(unhedged); 0 when the liability has no variance
    pub variance_reduction: f64,
}

impl HedgeEffectiveness {
    pub fn new(unhedged: &[f64], hedged: &[f64]) -> Self {
        let std_dev_unhedged = stats::population_std_dev(unhedged);
        let std_dev_hedged = stats::population_std_dev(hedged);
        let variance_reduction = if std_dev_unhedged > 0.0 {
            1.0 - (std_dev_hedged * std_dev_hedged) / (std_dev_unhedged * std_dev_unhedged)
        } else {
            0.0
        };

        Self {
            mean_unhedged: stats::mean(unhedged),
            mean_hedged: stats::mean(hedged),
            std_dev_unhedged,
            std_dev_hedged,
            variance_reduction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_metrics_on_uniform_grid() {
        // 1..=100: VaR at 95% interpolates to 95.05
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let m = RiskMetrics::from_present_values(&values).unwrap();

        assert_relative_eq!(m.var_95, 95.05, epsilon = 1e-9);
        // Values >= 95.05: 96..=100
        assert_relative_eq!(m.es_95, 98.0, epsilon = 1e-9);
        assert_relative_eq!(m.std_dev, (9999.0f64 / 12.0).sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn test_es_never_below_var() {
        let samples: Vec<Vec<f64>> = vec![
            vec![5.0],
            vec![3.0, 3.0, 3.0],
            vec![1.0, 10.0, 2.0, 7.0, 7.0, 100.0],
            (0..1000).map(|i| ((i * 7919) % 1000) as f64 * 0.37 - 50.0).collect(),
        ];
        for values in samples {
            let m = RiskMetrics::from_present_values(&values).unwrap();
            assert!(m.es_95 >= m.var_95, "ES {} < VaR {}", m.es_95, m.var_95);
        }
    }

    #[test]
    fn test_constant_distribution() {
        let m = RiskMetrics::from_present_values(&[42.0; 10]).unwrap();
        assert_eq!(m.var_95, 42.0);
        assert_eq!(m.es_95, 42.0);
        assert_eq!(m.std_dev, 0.0);
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        assert!(RiskMetrics::from_present_values(&[]).is_err());
        assert!(RiskMetrics::from_present_values(&[1.0, f64::NAN]).is_err());
        assert!(RiskMetrics::at_confidence(&[1.0], 1.0).is_err());
    }

    #[test]
    fn test_calculate_risk_metrics_keys() {
        let metrics = calculate_risk_metrics(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]).unwrap();
        assert_eq!(metrics.len(), 2);
        assert!(metrics[UNHEDGED].std_dev > 0.0);
        assert_eq!(metrics[HEDGED].std_dev, 0.0);
    }

    #[test]
    fn test_serialized_field_names() {
        let m = RiskMetrics {
            var_95: 1.0,
            es_95: 2.0,
            std_dev: 3.0,
        };
        let json = serde_json::to_value(m).unwrap();
        assert_eq!(json["VaR_95"], 1.0);
        assert_eq!(json["ES_95"], 2.0);
        assert_eq!(json["StdDev"], 3.0);
    }

    #[test]
    fn test_hedge_effectiveness() {
        let e = HedgeEffectiveness::new(&[1.0, 3.0], &[2.0, 2.0]);
        assert_relative_eq!(e.mean_unhedged, 2.0);
        assert_relative_eq!(e.variance_reduction, 1.0);
    }
}
