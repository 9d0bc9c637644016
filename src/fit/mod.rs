//! Curve fitting.
//!
//! One issuer at a time: the fitter knows nothing about tickers or ownership,
//! only durations and spreads.

pub mod fitter;

pub use fitter::*;
