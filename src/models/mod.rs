//! Curve model.
//!
//! The model is a small set of pure functions so the fitter, the classifier and
//! the exports share one definition of the curve.

pub mod model;

pub use model::*;
