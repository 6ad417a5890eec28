//! Longevity Engine CLI
//!
//! Loads an HMD mortality table, runs the full longevity analysis and reports
//! unhedged vs hedged risk metrics.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use longevity_engine::analysis::{AnalysisConfig, AnalysisResult, LongevityAnalysis};
use longevity_engine::risk::{HEDGED, UNHEDGED};

/// Stochastic mortality forecasting and longevity swap hedging analysis
#[derive(Parser)]
#[command(name = "longevity-engine", version)]
struct Cli {
    /// HMD 1x1 death-rate table (Mx_1x1.txt download or comma-separated export)
    #[arg(long)]
    mortality: PathBuf,

    /// JSON analysis configuration; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Master seed for the Monte Carlo simulations
    #[arg(long)]
    seed: Option<u64>,

    /// Number of simulated mortality paths
    #[arg(long)]
    simulations: Option<usize>,

    /// Years to forecast
    #[arg(long)]
    years: Option<usize>,

    /// Market price of longevity risk for the Wang transform
    #[arg(long)]
    lambda: Option<f64>,

    /// Directory for kt_fan_chart.csv and pv_distribution.csv
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Print the summary as JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn analysis_config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::from_json_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => AnalysisConfig::default(),
        };

        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(simulations) = self.simulations {
            config.simulations = simulations;
        }
        if let Some(years) = self.years {
            config.years_to_forecast = years;
        }
        if let Some(lambda) = self.lambda {
            config.lambda = lambda;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = cli.analysis_config()?;
    let matrix = config
        .loader()
        .load(&cli.mortality)
        .with_context(|| format!("loading mortality table {}", cli.mortality.display()))?;
    info!(
        "Loaded {} ages x {} years from {}",
        matrix.n_ages(),
        matrix.n_years(),
        cli.mortality.display()
    );

    let last_year = *matrix.years().last().context("mortality table has no years")?;
    let analysis = LongevityAnalysis::new(config);
    let result = analysis.run(&matrix).context("running longevity analysis")?;
    let summary = result.summary();

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_report(&result, analysis.config());
    }

    if let Some(dir) = &cli.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        write_fan_chart(&result, last_year, dir)?;
        write_pv_distribution(&result, dir)?;
        if !cli.json {
            println!("\nOutputs written to: {}", dir.display());
        }
    }

    Ok(())
}

fn print_report(result: &AnalysisResult, config: &AnalysisConfig) {
    println!("Longevity Engine v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================\n");

    let params = result.forecast.params();
    println!("Lee-Carter fit:");
    println!("  Ages: {}-{}", result.model.ages()[0], result.model.ages()[result.model.n_ages() - 1]);
    println!("  Explained variance: {:.2}%", result.model.explained_variance() * 100.0);
    println!("  kt drift: {:.6}", params.drift);
    println!("  kt volatility: {:.6}", params.volatility);
    println!();

    println!("Simulation:");
    println!("  Seed: {}", result.forecast.seed());
    println!("  Simulations: {}", result.survival.simulations());
    println!(
        "  Horizon: {} years (requested {})",
        result.horizon(),
        config.years_to_forecast
    );
    println!("  Cohort: {} lives aged {}", config.initial_count, result.model.ages()[result.start_age_index]);
    println!();

    println!("Longevity swap (lambda = {:.2}):", result.swap.lambda);
    println!("  Fixed leg PV: ${:.2}", result.swap.fixed_leg_pv);
    println!();

    println!("{:>10} {:>18} {:>18} {:>18}", "", "VaR 95", "ES 95", "Std Dev");
    println!("{}", "-".repeat(67));
    for key in [UNHEDGED, HEDGED] {
        if let Some(m) = result.risk_metrics.get(key) {
            println!("{:>10} {:>18.2} {:>18.2} {:>18.2}", key, m.var_95, m.es_95, m.std_dev);
        }
    }

    let e = &result.effectiveness;
    println!("\nHedge effectiveness:");
    println!("  Mean unhedged PV: ${:.2}", e.mean_unhedged);
    println!("  Mean hedged PV: ${:.2}", e.mean_hedged);
    println!("  Variance reduction: {:.2}%", e.variance_reduction * 100.0);
}

fn write_fan_chart(result: &AnalysisResult, last_year: u32, dir: &Path) -> Result<()> {
    let path = dir.join("kt_fan_chart.csv");
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in result.forecast.kt_fan_chart(last_year) {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_pv_distribution(result: &AnalysisResult, dir: &Path) -> Result<()> {
    let path = dir.join("pv_distribution.csv");
    let mut file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    writeln!(file, "Simulation,UnhedgedPV,HedgedPV,FloatingLegPV")?;
    for (sim, ((unhedged, hedged), floating)) in result
        .unhedged_pvs
        .iter()
        .zip(&result.hedged_pvs)
        .zip(&result.swap.floating_leg_pvs)
        .enumerate()
    {
        writeln!(file, "{},{:.6},{:.6},{:.6}", sim, unhedged, hedged, floating)?;
    }
    Ok(())
}
