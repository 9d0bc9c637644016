//! Shared domain types.
//!
//! Everything that flows between ingest, the curve core, the trade generator
//! and the reports is an explicit record here. Raw feed rows are converted into
//! these types at the ingest boundary; nothing downstream looks at column names.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{CurveError, FitFailure};

/// Strategy categories that never count as tradable holdings for investment grade.
pub const IG_EXCLUDED_STRATEGIES: [&str; 4] = ["INS", "MODEL", "PLEDGE", "UNSUP"];

/// Market segment. Each segment carries its own screening constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Segment {
    /// Investment grade.
    Ig,
    /// High yield.
    Hy,
}

impl Segment {
    pub fn display_name(self) -> &'static str {
        match self {
            Segment::Ig => "IG",
            Segment::Hy => "HY",
        }
    }
}

/// How sell and buy candidates are chosen inside an issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PairingMode {
    /// Owned bonds flagged below the curve against unowned bonds flagged above it.
    /// Requires a fitted curve.
    OutlierFiltered,
    /// Every owned bond against every bond of the issuer; no curve needed.
    Relaxed,
}

/// Screening constants for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRules {
    /// Outlier band as a percentage of the fitted spread.
    pub threshold_percent: f64,
    /// Minimum spread-per-duration ratio a pair must exceed.
    pub min_ratio: f64,
    /// Tickers with fewer observations are removed before fitting (0 disables).
    pub min_observations: usize,
    /// Minimum aggregated holding for a position to count as owned.
    pub min_holding: Option<f64>,
    /// Strategy labels excluded before aggregation.
    pub excluded_strategies: Vec<String>,
    pub pairing: PairingMode,
}

impl SegmentRules {
    pub fn for_segment(segment: Segment) -> Self {
        match segment {
            Segment::Ig => Self {
                threshold_percent: 5.0,
                min_ratio: 12.0,
                min_observations: 5,
                min_holding: Some(2_000_000.0),
                excluded_strategies: IG_EXCLUDED_STRATEGIES.iter().map(|s| s.to_string()).collect(),
                pairing: PairingMode::OutlierFiltered,
            },
            Segment::Hy => Self {
                threshold_percent: 10.0,
                min_ratio: 20.0,
                min_observations: 0,
                min_holding: None,
                excluded_strategies: Vec::new(),
                pairing: PairingMode::Relaxed,
            },
        }
    }
}

/// One bond on the screen date, after ingest-time coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct BondObservation {
    /// Display identity: `"{ticker} {coupon} {MM/DD/YYYY}"`.
    pub id: String,
    /// Instrument key used to join positions.
    pub cusip: String,
    /// Issuer grouping key.
    pub ticker: String,
    pub coupon: String,
    pub maturity_date: NaiveDate,
    /// Modified duration (years); always finite and > 0.
    pub duration: f64,
    /// Option-adjusted spread (bp).
    pub spread: f64,
}

impl BondObservation {
    pub fn compose_id(ticker: &str, coupon: &str, maturity_date: NaiveDate) -> String {
        format!("{ticker} {coupon} {}", maturity_date.format("%m/%d/%Y"))
    }
}

/// One row of the position feed.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub cusip: String,
    /// Trading desk / sub-account key.
    pub desk: String,
    pub strategy: String,
    /// Held par amount; `None` when the feed value was not numeric.
    pub quantity: Option<f64>,
}

/// A bond observation enriched with the derived ownership flag.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedBond {
    pub bond: BondObservation,
    pub owned: bool,
    /// Sorted, comma-joined strategy labels of the qualifying holdings.
    pub strategies: Option<String>,
    /// Aggregated quantity of the qualifying holdings.
    pub held_quantity: Option<f64>,
}

/// Nelson–Siegel coefficients for one issuer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveParams {
    /// β0: long-end level.
    pub level: f64,
    /// β1: short-end slope loading.
    pub slope: f64,
    /// β2: medium-term hump loading.
    pub curvature: f64,
    /// λ: decay rate of the slope and curvature loadings, in duration units.
    pub decay: f64,
}

impl CurveParams {
    /// Fixed solver seed.
    pub const INITIAL_GUESS: CurveParams = CurveParams {
        level: 0.01,
        slope: -0.01,
        curvature: 0.01,
        decay: 1.0,
    };

    pub fn to_array(self) -> [f64; 4] {
        [self.level, self.slope, self.curvature, self.decay]
    }

    pub fn from_slice(v: &[f64]) -> Self {
        Self {
            level: v[0],
            slope: v[1],
            curvature: v[2],
            decay: v[3],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

/// A successful fit and its diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFit {
    pub params: CurveParams,
    pub sse: f64,
    pub rmse: f64,
    pub n: usize,
    /// Objective evaluations used by the solver.
    pub evaluations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn label(self) -> &'static str {
        match self {
            Direction::Above => "Above",
            Direction::Below => "Below",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutlierKind {
    /// Owned and trading rich (below the band): sell candidate.
    BelowOwned,
    /// Unowned and trading cheap (above the band): buy candidate.
    AboveUnowned,
}

/// Per-observation comparison against a fitted curve.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationRecord {
    pub id: String,
    pub cusip: String,
    pub duration: f64,
    pub spread: f64,
    pub owned: bool,
    pub fitted: f64,
    /// `spread - fitted` (bp).
    pub deviation: f64,
    pub direction: Direction,
    pub outlier: Option<OutlierKind>,
}

/// One side of a trade candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLeg {
    pub id: String,
    pub cusip: String,
    pub duration: f64,
    pub spread: f64,
    /// Deviation from the issuer curve, when a curve was fitted.
    pub deviation: Option<f64>,
}

/// Sell an owned bond, buy a longer one of the same issuer.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeCandidate {
    pub ticker: String,
    pub sell: TradeLeg,
    pub buy: TradeLeg,
    pub sell_strategies: Option<String>,
    /// `spread_diff / duration_diff`.
    pub ratio: f64,
    pub spread_diff: f64,
    pub duration_diff: f64,
    /// `buy.deviation - sell.deviation`, when both legs carry a deviation.
    pub deviation_diff: Option<f64>,
}

/// Why an issuer contributed nothing to a screen.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Fewer observations than the fit (or the segment) requires.
    InsufficientData { count: usize, required: usize },
    FitFailed(FitFailure),
    CurveUnavailable(CurveError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::InsufficientData { count, required } => {
                write!(f, "not enough bonds to fit a curve ({count} < {required})")
            }
            SkipReason::FitFailed(e) => write!(f, "curve fit failed: {e}"),
            SkipReason::CurveUnavailable(e) => write!(f, "curve unavailable: {e}"),
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// Derived from CLI flags (plus segment defaults).
#[derive(Debug, Clone)]
pub struct ScreenConfig {
    pub segment: Segment,
    pub rules: SegmentRules,
    /// Optional single-ticker view.
    pub ticker: Option<String>,
    /// Rows shown per table (0 = all).
    pub top_n: usize,
    pub export_trades: Option<PathBuf>,
    pub export_deviations: Option<PathBuf>,
    pub export_curve: Option<PathBuf>,
}

/// A saved issuer curve (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub segment: Segment,
    pub ticker: String,
    pub fit: CurveFit,
    pub threshold_percent: f64,
    pub grid: CurveGrid,
}

/// Fitted curve and outlier bands sampled on ascending durations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurveGrid {
    pub duration: Vec<f64>,
    pub fitted: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}
