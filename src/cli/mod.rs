//! Command-line parsing for the relative-value trade screen.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the screening/math code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::Segment;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "rv", version, about = "Corporate bond relative-value trade screen")]
pub struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Screen a bond universe against positions and print trade candidates.
    Screen(ScreenArgs),
    /// Fit and print one issuer's curve, optionally exporting it as JSON.
    Curve(CurveArgs),
    /// Screen a seeded synthetic universe (no input files needed).
    Demo(DemoArgs),
}

/// Input feeds.
#[derive(Debug, Args, Clone)]
pub struct FeedArgs {
    /// Bond analytics CSV (ticker, coupon, maturdate, cusip, duradjmod, oas_bp).
    #[arg(long, env = "RV_BONDS_CSV", value_name = "CSV")]
    pub bonds: PathBuf,

    /// Positions CSV (cusip, tick, crd_strategy, share_par_value).
    #[arg(long, env = "RV_POSITIONS_CSV", value_name = "CSV")]
    pub positions: PathBuf,
}

/// Segment and overrides of its screening constants.
#[derive(Debug, Args, Clone)]
pub struct RuleArgs {
    /// Market segment (sets the default constants below).
    #[arg(short, long, value_enum, default_value_t = Segment::Ig)]
    pub segment: Segment,

    /// Outlier band, percent of the fitted spread.
    #[arg(long, value_name = "PCT")]
    pub threshold: Option<f64>,

    /// Minimum spread pickup per year of duration extension (bp).
    #[arg(long)]
    pub min_ratio: Option<f64>,

    /// Drop tickers with fewer bonds than this before fitting.
    #[arg(long)]
    pub min_observations: Option<usize>,

    /// Minimum aggregated holding per desk for a bond to count as owned.
    #[arg(long)]
    pub min_holding: Option<f64>,
}

/// Output options shared by `screen` and `demo`.
#[derive(Debug, Args, Clone)]
pub struct OutputArgs {
    /// Also show the single-ticker view for this issuer.
    #[arg(short, long)]
    pub ticker: Option<String>,

    /// Rows shown per table (0 = all).
    #[arg(long, default_value_t = 25)]
    pub top: usize,

    /// Export universe trade candidates to CSV.
    #[arg(long = "export-trades", value_name = "CSV")]
    pub export_trades: Option<PathBuf>,

    /// Export per-bond curve deviations to CSV.
    #[arg(long = "export-deviations", value_name = "CSV")]
    pub export_deviations: Option<PathBuf>,

    /// Export the `--ticker` curve (params + grid + bands) to JSON.
    #[arg(long = "export-curve", value_name = "JSON")]
    pub export_curve: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ScreenArgs {
    #[command(flatten)]
    pub feeds: FeedArgs,

    #[command(flatten)]
    pub rules: RuleArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct CurveArgs {
    #[command(flatten)]
    pub feeds: FeedArgs,

    #[command(flatten)]
    pub rules: RuleArgs,

    /// Issuer ticker.
    #[arg(short, long)]
    pub ticker: String,

    /// Write the curve JSON here.
    #[arg(long = "export-curve", value_name = "JSON")]
    pub export_curve: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    #[command(flatten)]
    pub rules: RuleArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Random seed for the synthetic universe.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of synthetic issuers.
    #[arg(long, default_value_t = 12)]
    pub issuers: usize,
}
