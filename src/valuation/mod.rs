//! Liability valuation: yield curves, discounting and pension cashflows

mod discount;
mod pension;

pub use discount::{discounted_column_sums, YieldCurve, YieldCurveSpec};
pub use pension::PensionLiability;
