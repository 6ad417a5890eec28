//! Descriptive statistics over simulated outcome vectors

use serde::{Deserialize, Serialize};

/// Arithmetic mean (0.0 for an empty slice)
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by n, not n - 1)
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Percentile of an ascending-sorted slice using linear interpolation between
/// closest ranks
///
/// # Arguments
/// * `sorted` - Values sorted ascending, must be non-empty
/// * `q` - Percentile in [0, 100]
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }

    let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

/// Sort a copy of `values` ascending and return it
pub fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// A single histogram bin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub frequency: f64,
}

/// Equal-width histogram over `[min, max]` of the values
///
/// The last bin is closed on the right so the maximum is counted.
pub fn histogram(values: &[f64], n_bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || n_bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / n_bins as f64;

    // Degenerate distribution (e.g. a perfectly hedged position): one bin holds everything
    if width <= 0.0 {
        return vec![HistogramBin {
            lower: min,
            upper: max,
            count: values.len(),
            frequency: 1.0,
        }];
    }

    let mut counts = vec![0usize; n_bins];
    for &v in values {
        let idx = (((v - min) / width) as usize).min(n_bins - 1);
        counts[idx] += 1;
    }

    let total = values.len() as f64;
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: min + width * i as f64,
            upper: min + width * (i + 1) as f64,
            count,
            frequency: count as f64 / total,
        })
        .collect()
}
