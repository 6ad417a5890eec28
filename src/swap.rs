//! Longevity swap pricing
//!
//! The floating leg pays realised survival on each simulated path. The fixed
//! leg is priced once: the best-estimate (mean) survival curve is shifted to
//! risk-neutral probabilities with the Wang transform
//!
//! ```text
//! p* = Phi(Phi^-1(p) + lambda)
//! ```
//!
//! where `lambda` is the market price of longevity risk. Both legs are
//! discounted on the same curve and scaled by the liability notional, so
//! `liability - (floating - fixed)` collapses to the fixed leg.

use log::info;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{LongevityError, Result};
use crate::survival::SurvivalPathMatrix;
use crate::valuation::{discounted_column_sums, YieldCurve};

/// Probabilities are clipped into [WANG_CLIP, 1 - WANG_CLIP] before the
/// inverse normal CDF
pub const WANG_CLIP: f64 = 1e-10;

/// Default market price of longevity risk
pub const DEFAULT_LAMBDA: f64 = 0.20;

/// Wang transform with a fixed risk load
#[derive(Debug, Clone)]
pub struct WangTransform {
    lambda: f64,
    normal: Normal,
}

impl WangTransform {
    pub fn new(lambda: f64) -> Result<Self> {
        if !lambda.is_finite() {
            return Err(LongevityError::InvalidInput(format!(
                "market price of risk must be finite, got {}",
                lambda
            )));
        }
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| LongevityError::Numerical(format!("standard normal: {}", e)))?;
        Ok(Self { lambda, normal })
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Transform one probability (clipped, never infinite)
    #[inline]
    pub fn apply(&self, p: f64) -> f64 {
        let clipped = p.clamp(WANG_CLIP, 1.0 - WANG_CLIP);
        self.normal.cdf(self.normal.inverse_cdf(clipped) + self.lambda)
    }

    /// Transform a vector of probabilities; each must lie in [0, 1]
    pub fn apply_all(&self, probabilities: &[f64]) -> Result<Vec<f64>> {
        if let Some(p) = probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(LongevityError::InvalidInput(format!(
                "probability {} outside [0, 1]",
                p
            )));
        }
        Ok(probabilities.iter().map(|&p| self.apply(p)).collect())
    }
}

/// Wang-transform a vector of survival probabilities
pub fn wang_transform(probabilities: &[f64], lambda: f64) -> Result<Vec<f64>> {
    WangTransform::new(lambda)?.apply_all(probabilities)
}

/// Priced legs of a longevity swap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapLegResult {
    /// Market price of risk the fixed leg was priced at
    pub lambda: f64,

    /// Risk-neutral price of the fixed leg (same for every simulation)
    pub fixed_leg_pv: f64,

    /// Realised floating leg value per simulation
    pub floating_leg_pvs: Vec<f64>,

    /// floating - fixed, per simulation
    pub net_swap_payments: Vec<f64>,

    /// Mean survival curve the fixed leg was priced from
    pub best_estimate_survival: Vec<f64>,

    /// Wang-transformed best-estimate curve
    pub risk_neutral_survival: Vec<f64>,
}

impl SwapLegResult {
    /// Liability cost after receiving the net swap payment:
    /// `unhedged[s] - (floating[s] - fixed)`
    pub fn hedged_present_values(&self, unhedged: &[f64]) -> Result<Vec<f64>> {
        if unhedged.len() != self.net_swap_payments.len() {
            return Err(LongevityError::dimension(
                "unhedged present values vs swap simulations",
                self.net_swap_payments.len(),
                unhedged.len(),
            ));
        }
        Ok(unhedged
            .iter()
            .zip(&self.net_swap_payments)
            .map(|(pv, net)| pv - net)
            .collect())
    }
}

/// Prices longevity swaps at a configured market price of risk
#[derive(Debug, Clone)]
pub struct LongevitySwapPricer {
    transform: WangTransform,
}

impl LongevitySwapPricer {
    pub fn new(lambda: f64) -> Result<Self> {
        Ok(Self {
            transform: WangTransform::new(lambda)?,
        })
    }

    pub fn lambda(&self) -> f64 {
        self.transform.lambda()
    }

    /// Price both legs from the same survival paths used for the liability
    ///
    /// # Arguments
    /// * `survival` - Real-world survival paths, (horizon + 1) x simulations
    /// * `curve` - Spot curve with one rate per survival row
    /// * `initial_count` - Pensioners covered by the swap
    /// * `annual_pension` - Annual payment per survivor
    pub fn price_legs(
        &self,
        survival: &SurvivalPathMatrix,
        curve: &YieldCurve,
        initial_count: f64,
        annual_pension: f64,
    ) -> Result<SwapLegResult> {
        if curve.len() != survival.rows() {
            return Err(LongevityError::dimension(
                "yield curve length vs survival periods",
                survival.rows(),
                curve.len(),
            ));
        }

        let notional = initial_count * annual_pension;
        let discount_factors = curve.discount_factors();

        // Floating leg: realised survival on each path
        let floating_leg_pvs: Vec<f64> = discounted_column_sums(survival.as_matrix(), &discount_factors)?
            .into_iter()
            .map(|pv| pv * notional)
            .collect();

        // Fixed leg: risk-neutral best estimate
        let best_estimate_survival = survival.mean_path();
        let risk_neutral_survival = self.transform.apply_all(&best_estimate_survival)?;
        let fixed_leg_pv = notional
            * risk_neutral_survival
                .iter()
                .zip(&discount_factors)
                .map(|(p, df)| p * df)
                .sum::<f64>();

        let net_swap_payments = floating_leg_pvs.iter().map(|f| f - fixed_leg_pv).collect();

        info!(
            "Priced longevity swap: lambda={:.4}, fixed leg PV={:.2}",
            self.lambda(),
            fixed_leg_pv
        );

        Ok(SwapLegResult {
            lambda: self.lambda(),
            fixed_leg_pv,
            floating_leg_pvs,
            net_swap_payments,
            best_estimate_survival,
            risk_neutral_survival,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn paths() -> SurvivalPathMatrix {
        SurvivalPathMatrix::new(DMatrix::from_column_slice(
            4,
            3,
            &[
                1.0, 0.97, 0.93, 0.88, //
                1.0, 0.98, 0.95, 0.91, //
                1.0, 0.96, 0.91, 0.85,
            ],
        ))
        .unwrap()
    }

    #[test]
    fn test_wang_identity_at_zero_lambda() {
        let t = WangTransform::new(0.0).unwrap();
        for p in [0.01, 0.3, 0.5, 0.77, 0.999] {
            assert_relative_eq!(t.apply(p), p, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_wang_positive_lambda_raises_survival() {
        let t = WangTransform::new(0.25).unwrap();
        for p in [0.1, 0.5, 0.9] {
            let q = t.apply(p);
            assert!(q > p && q < 1.0);
        }
    }

    #[test]
    fn test_wang_clips_extremes() {
        let t = WangTransform::new(0.2).unwrap();
        assert!(t.apply(0.0).is_finite());
        assert!(t.apply(1.0).is_finite());
        assert!(t.apply(1.0) <= 1.0);
    }

    #[test]
    fn test_wang_rejects_invalid_probability() {
        assert!(matches!(
            wang_transform(&[0.5, 1.5], 0.2),
            Err(LongevityError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_zero_lambda_fixed_leg_is_mean_floating_leg() {
        let pricer = LongevitySwapPricer::new(0.0).unwrap();
        let curve = YieldCurve::flat(0.04, 4).unwrap();
        let legs = pricer.price_legs(&paths(), &curve, 1000.0, 10_000.0).unwrap();

        let mean_floating = legs.floating_leg_pvs.iter().sum::<f64>() / 3.0;
        assert_relative_eq!(legs.fixed_leg_pv, mean_floating, max_relative = 1e-8);
    }

    #[test]
    fn test_positive_lambda_charges_a_premium() {
        let curve = YieldCurve::flat(0.04, 4).unwrap();
        let neutral = LongevitySwapPricer::new(0.0).unwrap();
        let loaded = LongevitySwapPricer::new(DEFAULT_LAMBDA).unwrap();

        let a = neutral.price_legs(&paths(), &curve, 1000.0, 10_000.0).unwrap();
        let b = loaded.price_legs(&paths(), &curve, 1000.0, 10_000.0).unwrap();
        assert!(b.fixed_leg_pv > a.fixed_leg_pv);
        assert_eq!(a.floating_leg_pvs, b.floating_leg_pvs);
        assert_eq!(a.lambda, 0.0);
        assert_eq!(b.lambda, DEFAULT_LAMBDA);
    }

    #[test]
    fn test_floating_leg_scaled_by_notional() {
        let pricer = LongevitySwapPricer::new(0.2).unwrap();
        let curve = YieldCurve::flat(0.0, 4).unwrap();
        let legs = pricer.price_legs(&paths(), &curve, 2.0, 50.0).unwrap();

        // Zero rates: PV is notional * sum of survival
        assert_relative_eq!(legs.floating_leg_pvs[0], 100.0 * 3.78, max_relative = 1e-12);
        assert_relative_eq!(
            legs.net_swap_payments[1],
            legs.floating_leg_pvs[1] - legs.fixed_leg_pv
        );
    }

    #[test]
    fn test_hedged_values_collapse_to_fixed_leg() {
        let pricer = LongevitySwapPricer::new(0.2).unwrap();
        let curve = YieldCurve::flat(0.03, 4).unwrap();
        let legs = pricer.price_legs(&paths(), &curve, 1000.0, 10_000.0).unwrap();

        // The liability valued on the same paths equals the floating leg
        let hedged = legs.hedged_present_values(&legs.floating_leg_pvs).unwrap();
        for pv in hedged {
            assert_relative_eq!(pv, legs.fixed_leg_pv, max_relative = 1e-12);
        }
        assert!(legs.hedged_present_values(&[1.0]).is_err());
    }

    #[test]
    fn test_curve_length_must_match() {
        let pricer = LongevitySwapPricer::new(DEFAULT_LAMBDA).unwrap();
        let curve = YieldCurve::flat(0.04, 3).unwrap();
        let result = pricer.price_legs(&paths(), &curve, 1.0, 1.0);
        assert!(matches!(result, Err(LongevityError::DimensionMismatch { .. })));
    }
}
