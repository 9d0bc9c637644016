//! Synthetic bond universe for demos and tests.
//!
//! Each issuer gets its own Nelson–Siegel baseline; observed spreads are the
//! baseline times log-normal noise with occasional jumps (wide or tight), so
//! every run contains a few genuine outliers. Positions are drawn on a random
//! subset of bonds, including some small and some excluded-strategy holdings.

use chrono::{Days, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{BondObservation, CurveParams, PositionRow, Segment};
use crate::error::AppError;
use crate::models::predict;

const DESKS: [&str; 3] = ["HG1", "HG2", "MAC"];
const STRATEGIES: [&str; 4] = ["CORE", "TOTAL", "ALPHA", "LIQ"];

/// Generator settings.
#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub segment: Segment,
    pub seed: u64,
    pub issuers: usize,
    pub min_bonds: usize,
    pub max_bonds: usize,
    /// Share of bonds that get a position.
    pub owned_fraction: f64,
    /// Daily-style log volatility of the spread noise.
    pub sigma: f64,
    pub jump_prob_wide: f64,
    pub jump_prob_tight: f64,
    pub jump_k_wide: f64,
    pub jump_k_tight: f64,
}

impl SampleConfig {
    pub fn for_segment(segment: Segment, seed: u64) -> Self {
        Self {
            segment,
            seed,
            issuers: 12,
            min_bonds: 3,
            max_bonds: 14,
            owned_fraction: 0.35,
            sigma: 0.04,
            jump_prob_wide: 0.06,
            jump_prob_tight: 0.06,
            jump_k_wide: 3.0,
            jump_k_tight: 3.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SampleUniverse {
    pub asof_date: NaiveDate,
    pub bonds: Vec<BondObservation>,
    pub positions: Vec<PositionRow>,
    /// Baseline spread of each bond before noise.
    pub baseline: Vec<f64>,
}

pub fn generate_universe(config: &SampleConfig) -> Result<SampleUniverse, AppError> {
    if config.issuers == 0 {
        return Err(AppError::new(2, "Issuer count must be > 0."));
    }
    if config.min_bonds == 0 || config.max_bonds < config.min_bonds {
        return Err(AppError::new(2, "Invalid bonds-per-issuer range."));
    }
    if !(0.0..=1.0).contains(&config.owned_fraction) {
        return Err(AppError::new(2, "Owned fraction must be within [0, 1]."));
    }
    if config.jump_prob_wide < 0.0
        || config.jump_prob_tight < 0.0
        || (config.jump_prob_wide + config.jump_prob_tight) >= 1.0
    {
        return Err(AppError::new(2, "Invalid jump probability settings."));
    }
    if !(config.sigma.is_finite()
        && config.sigma > 0.0
        && config.jump_k_wide.is_finite()
        && config.jump_k_tight.is_finite()
        && config.jump_k_wide > 0.0
        && config.jump_k_tight > 0.0)
    {
        return Err(AppError::new(2, "Invalid noise or jump magnitude settings."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;
    let asof_date = NaiveDate::from_ymd_opt(2025, 1, 2).ok_or_else(|| AppError::new(4, "Invalid as-of date."))?;
    let mean_correction = jump_mean_correction(
        config.sigma,
        config.jump_prob_wide,
        config.jump_prob_tight,
        config.jump_k_wide,
        config.jump_k_tight,
    );

    let (level_range, max_duration) = match config.segment {
        Segment::Ig => (70.0..180.0, 16.0),
        Segment::Hy => (280.0..650.0, 8.0),
    };

    let mut bonds = Vec::new();
    let mut positions = Vec::new();
    let mut baseline = Vec::new();

    for issuer in 0..config.issuers {
        let ticker = ticker_name(issuer);
        let level: f64 = rng.gen_range(level_range.clone());
        let curve = CurveParams {
            level,
            slope: -level * rng.gen_range(0.2..0.6),
            curvature: level * rng.gen_range(-0.3..0.3),
            decay: rng.gen_range(1.0..3.5),
        };

        let n_bonds = rng.gen_range(config.min_bonds..=config.max_bonds);
        for i in 0..n_bonds {
            let duration: f64 = rng.gen_range(0.4..max_duration);
            let base = predict(duration, &curve).max(5.0);
            let z = normal.sample(&mut rng);
            let jump = sample_jump(
                &mut rng,
                config.jump_prob_wide,
                config.jump_prob_tight,
                config.jump_k_wide,
                config.jump_k_tight,
            );
            let spread = base * (config.sigma * (z + jump) - mean_correction).exp();

            let coupon = format_coupon(rng.gen_range(8..=60) as f64 * 0.125);
            // Maturity runs a little past duration for a coupon bond.
            let days = (duration * 1.12 * 365.25).round() as u64;
            let maturity_date = asof_date
                .checked_add_days(Days::new(days))
                .ok_or_else(|| AppError::new(4, "Maturity date out of range."))?;
            let cusip = format!("{ticker:X<4}{:03}{}", i + 1, (b'A' + (issuer % 26) as u8) as char);

            if rng.r#gen::<f64>() < config.owned_fraction {
                positions.extend(sample_positions(&mut rng, &cusip, config.segment));
            }

            baseline.push(base);
            bonds.push(BondObservation {
                id: BondObservation::compose_id(&ticker, &coupon, maturity_date),
                cusip,
                ticker: ticker.clone(),
                coupon,
                maturity_date,
                duration: round_to(duration, 3),
                spread: round_to(spread, 1),
            });
        }
    }

    Ok(SampleUniverse {
        asof_date,
        bonds,
        positions,
        baseline,
    })
}

/// One or two position rows for an owned bond.
fn sample_positions(rng: &mut StdRng, cusip: &str, segment: Segment) -> Vec<PositionRow> {
    let desk = DESKS[rng.gen_range(0..DESKS.len())];
    // Mostly tradable strategies; an occasional insurance-book holding.
    let strategy = if rng.r#gen::<f64>() < 0.1 {
        "INS"
    } else {
        STRATEGIES[rng.gen_range(0..STRATEGIES.len())]
    };
    let lots = match segment {
        Segment::Ig => rng.gen_range(2..=32),
        Segment::Hy => rng.gen_range(1..=12),
    };
    let total = lots as f64 * 250_000.0;

    if rng.r#gen::<f64>() < 0.3 {
        let first = (total / 2.0).round();
        vec![
            position(cusip, desk, strategy, first),
            position(cusip, desk, STRATEGIES[0], total - first),
        ]
    } else {
        vec![position(cusip, desk, strategy, total)]
    }
}

fn position(cusip: &str, desk: &str, strategy: &str, quantity: f64) -> PositionRow {
    PositionRow {
        cusip: cusip.to_string(),
        desk: desk.to_string(),
        strategy: strategy.to_string(),
        quantity: Some(quantity),
    }
}

/// `0 -> "AAA"`, `1 -> "AAB"`, ...
fn ticker_name(index: usize) -> String {
    let mut n = index;
    let mut chars = [b'A'; 3];
    for c in chars.iter_mut().rev() {
        *c = b'A' + (n % 26) as u8;
        n /= 26;
    }
    chars.iter().map(|&c| c as char).collect()
}

fn format_coupon(c: f64) -> String {
    let s = format!("{c:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn round_to(v: f64, dp: i32) -> f64 {
    let m = 10f64.powi(dp);
    (v * m).round() / m
}

// Mean correction so E[exp(log-noise)] == 1.0 (keeps baseline unbiased).
fn jump_mean_correction(sigma: f64, p_wide: f64, p_tight: f64, k_wide: f64, k_tight: f64) -> f64 {
    let p_none = 1.0 - p_wide - p_tight;
    let m1 = p_none + p_wide * (sigma * k_wide).exp() + p_tight * (-sigma * k_tight).exp();
    0.5 * sigma * sigma + m1.ln()
}

fn sample_jump(rng: &mut StdRng, p_wide: f64, p_tight: f64, k_wide: f64, k_tight: f64) -> f64 {
    let roll: f64 = rng.r#gen();
    if roll < p_wide {
        k_wide
    } else if roll < p_wide + p_tight {
        -k_tight
    } else {
        0.0
    }
}
