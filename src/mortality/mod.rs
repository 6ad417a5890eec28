//! Historical mortality data and the Lee-Carter factor model
//!
//! - `LogMortalityMatrix`: validated age x year surface of log central death rates
//! - `LeeCarterModel`: rank-1 SVD fit producing an immutable `FittedMortalityModel`
//! - `loader`: ingestion of Human Mortality Database 1x1 tables

mod matrix;
mod lee_carter;
pub mod loader;

pub use matrix::LogMortalityMatrix;
pub use lee_carter::{LeeCarterModel, FittedMortalityModel};
pub use loader::{MortalityTableLoader, Sex};
