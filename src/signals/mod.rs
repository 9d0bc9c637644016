//! Relative-value signals derived from a fitted issuer curve.
//!
//! - `outliers`: deviation of each bond from the curve and the two outlier sets
//! - `trades`: sell/buy pair enumeration, ratio filter and ordering

pub mod outliers;
pub mod trades;

pub use outliers::*;
pub use trades::*;
