//! Curve JSON export.
//!
//! Curve JSON is the portable representation of one issuer's fitted curve:
//! - parameters plus fit diagnostics
//! - segment and outlier threshold
//! - a precomputed grid with the outlier bands for quick plotting
//!
//! The schema is defined by `domain::CurveFile`.

use std::fs::File;
use std::path::Path;

use crate::domain::{CurveFile, CurveFit, CurveGrid, Segment};
use crate::error::AppError;
use crate::models::evaluate_many;

const GRID_POINTS: usize = 101;

/// Build the curve file for one issuer.
///
/// The grid spans the observed duration range.
pub fn curve_file(
    segment: Segment,
    ticker: &str,
    fit: &CurveFit,
    threshold_percent: f64,
    durations: &[f64],
) -> Result<CurveFile, AppError> {
    let lo = durations.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = durations.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let grid = build_grid(fit, threshold_percent, lo, hi, GRID_POINTS)?;

    Ok(CurveFile {
        tool: "rv".to_string(),
        segment,
        ticker: ticker.to_string(),
        fit: fit.clone(),
        threshold_percent,
        grid,
    })
}

/// Write a curve JSON file.
pub fn write_curve_json(path: &Path, curve: &CurveFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(4, format!("Failed to create curve JSON '{}': {e}", path.display())))?;

    serde_json::to_writer_pretty(file, curve)
        .map_err(|e| AppError::new(4, format!("Failed to write curve JSON: {e}")))?;

    Ok(())
}

/// Sample the curve and its `fitted × (1 ± t/100)` bands on `n` ascending durations.
pub fn build_grid(fit: &CurveFit, threshold_percent: f64, lo: f64, hi: f64, n: usize) -> Result<CurveGrid, AppError> {
    let n = n.max(2);
    let mut d0 = lo;
    let mut d1 = hi;
    if !(d0.is_finite() && d1.is_finite()) || d0 <= 0.0 || d1 < d0 {
        d0 = 0.25;
        d1 = 30.0;
    }
    if (d1 - d0).abs() < 1e-9 {
        d0 = (d0 - 0.5).max(0.01);
        d1 += 0.5;
    }

    let duration: Vec<f64> = (0..n)
        .map(|i| d0 + (i as f64 / (n as f64 - 1.0)) * (d1 - d0))
        .collect();
    let fitted = evaluate_many(&duration, &fit.params)
        .map_err(|e| AppError::new(4, format!("Cannot sample fitted curve: {e}")))?;

    let t = threshold_percent / 100.0;
    let upper = fitted.iter().map(|f| f * (1.0 + t)).collect();
    let lower = fitted.iter().map(|f| f * (1.0 - t)).collect();

    Ok(CurveGrid {
        duration,
        fitted,
        upper,
        lower,
    })
}
