//! Mathematical utilities: Nelson–Siegel loadings, linear least squares and
//! Levenberg–Marquardt.

pub mod basis;
pub mod levmar;
pub mod ols;

pub use basis::*;
pub use levmar::*;
pub use ols::*;

/// Round to two decimals, the precision trade ratios and spreads are shown at.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
