//! Human Mortality Database 1x1 table loader
//!
//! Reads an HMD death-rate table with columns `Year Age Female Male Total`,
//! pivots it into an age x year grid and returns the log surface ready for
//! fitting. Both layouts are accepted:
//! - the `Mx_1x1.txt` download: a title line and blank line, then
//!   whitespace-separated columns
//! - a comma-separated export with the same header
//!
//! `Age` may carry a `+` suffix (`110+`) and rates may be `.` when HMD has no
//! estimate.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::matrix::LogMortalityMatrix;
use crate::error::{LongevityError, Result};

/// Floor applied to death rates before taking logs
pub const MIN_DEATH_RATE: f64 = 1e-10;

/// Which rate column of the HMD table to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sex {
    Female,
    Male,
    #[default]
    Total,
}

/// Raw CSV row matching the HMD Mx_1x1 columns
#[derive(Debug, Deserialize)]
struct HmdRow {
    #[serde(rename = "Year")]
    year: u32,
    #[serde(rename = "Age")]
    age: String,
    #[serde(rename = "Female")]
    female: String,
    #[serde(rename = "Male")]
    male: String,
    #[serde(rename = "Total")]
    total: String,
}

impl HmdRow {
    fn rate_for(&self, sex: Sex) -> &str {
        match sex {
            Sex::Female => &self.female,
            Sex::Male => &self.male,
            Sex::Total => &self.total,
        }
    }
}

/// Loader configuration: age band and sex column
#[derive(Debug, Clone)]
pub struct MortalityTableLoader {
    pub min_age: u32,
    pub max_age: u32,
    pub sex: Sex,
}

impl Default for MortalityTableLoader {
    fn default() -> Self {
        Self {
            min_age: 0,
            max_age: 95,
            sex: Sex::Total,
        }
    }
}

impl MortalityTableLoader {
    pub fn new(min_age: u32, max_age: u32, sex: Sex) -> Self {
        Self { min_age, max_age, sex }
    }

    /// Load a table from disk
    pub fn load(&self, path: &Path) -> Result<LogMortalityMatrix> {
        let file = File::open(path)?;
        info!("Loading mortality table from {}", path.display());
        self.read_from(file)
    }

    /// Load a table from any reader
    pub fn read_from<R: Read>(&self, mut reader: R) -> Result<LogMortalityMatrix> {
        if self.min_age > self.max_age {
            return Err(LongevityError::InvalidInput(format!(
                "min_age {} exceeds max_age {}",
                self.min_age, self.max_age
            )));
        }

        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        let table = normalize_table(&raw)?;

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(table.as_bytes());

        // age -> year -> rate (None = missing or zero)
        let mut cells: BTreeMap<u32, BTreeMap<u32, Option<f64>>> = BTreeMap::new();
        let mut years = BTreeSet::new();

        for result in reader.deserialize() {
            let row: HmdRow = result?;
            let age = parse_age(&row.age)?;
            years.insert(row.year);

            if age < self.min_age || age > self.max_age {
                continue;
            }
            let rate = parse_rate(row.rate_for(self.sex))?;
            cells.entry(age).or_default().insert(row.year, rate);
        }

        if cells.is_empty() {
            return Err(LongevityError::InvalidInput(format!(
                "no rows for ages {}..={}",
                self.min_age, self.max_age
            )));
        }

        let years: Vec<u32> = years.into_iter().collect();
        let ages: Vec<u32> = cells.keys().copied().collect();

        let mut filled_total = 0;
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(ages.len());
        for (age, by_year) in &cells {
            let raw: Vec<Option<f64>> = years
                .iter()
                .map(|y| by_year.get(y).copied().flatten())
                .collect();
            let (row, filled) = fill_gaps(&raw).ok_or_else(|| {
                LongevityError::InvalidInput(format!("age {} has no observed death rates", age))
            })?;
            filled_total += filled;
            rows.push(row.into_iter().map(|m| m.max(MIN_DEATH_RATE).ln()).collect());
        }

        if filled_total > 0 {
            warn!("Interpolated {} missing or zero death rates along the year axis", filled_total);
        }
        info!(
            "Loaded {} ages ({}..={}) x {} years ({}..={})",
            ages.len(),
            ages[0],
            ages[ages.len() - 1],
            years.len(),
            years.first().copied().unwrap_or_default(),
            years.last().copied().unwrap_or_default(),
        );

        LogMortalityMatrix::from_rows(ages, years, &rows)
    }
}

/// Drop any preamble before the `Year` header and rewrite whitespace-separated
/// columns as comma-separated ones
fn normalize_table(raw: &str) -> Result<String> {
    let mut lines = raw
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("Year"));
    let header = lines.next().ok_or_else(|| {
        LongevityError::InvalidInput("no `Year Age Female Male Total` header found".into())
    })?;
    let comma_separated = header.contains(',');

    let mut table = String::with_capacity(raw.len());
    for line in std::iter::once(header).chain(lines) {
        if line.trim().is_empty() {
            continue;
        }
        if comma_separated {
            table.push_str(line);
        } else {
            table.push_str(&line.split_whitespace().collect::<Vec<_>>().join(","));
        }
        table.push('\n');
    }
    Ok(table)
}

/// Parse an HMD age label; the open interval `110+` becomes 110
fn parse_age(raw: &str) -> Result<u32> {
    raw.trim_end_matches('+')
        .parse()
        .map_err(|_| LongevityError::InvalidInput(format!("unparseable age: {:?}", raw)))
}

/// Parse a death rate; `.`, blanks and zeros are gaps
fn parse_rate(raw: &str) -> Result<Option<f64>> {
    if raw.is_empty() || raw == "." {
        return Ok(None);
    }
    let rate: f64 = raw
        .parse()
        .map_err(|_| LongevityError::InvalidInput(format!("unparseable death rate: {:?}", raw)))?;
    if !rate.is_finite() || rate < 0.0 {
        return Err(LongevityError::InvalidInput(format!("invalid death rate: {}", rate)));
    }
    Ok(if rate == 0.0 { None } else { Some(rate) })
}

/// Fill gaps linearly between observed years; edge gaps take the nearest
/// observed value. Returns the filled row and the number of cells filled, or
/// `None` when nothing was observed.
fn fill_gaps(raw: &[Option<f64>]) -> Option<(Vec<f64>, usize)> {
    let observed: Vec<(usize, f64)> = raw
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|m| (i, m)))
        .collect();
    let (first_idx, first_val) = *observed.first()?;
    let (last_idx, last_val) = *observed.last()?;

    let mut row = vec![0.0; raw.len()];
    for slot in row.iter_mut().take(first_idx) {
        *slot = first_val;
    }
    for slot in row.iter_mut().skip(last_idx) {
        *slot = last_val;
    }
    for pair in observed.windows(2) {
        let (i0, v0) = pair[0];
        let (i1, v1) = pair[1];
        for (i, slot) in row.iter_mut().enumerate().take(i1).skip(i0) {
            let w = (i - i0) as f64 / (i1 - i0) as f64;
            *slot = v0 + (v1 - v0) * w;
        }
    }

    Some((row, raw.len() - observed.len()))
}
