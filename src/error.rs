//! Error types.
//!
//! Two layers:
//! - `AppError`: application-level failures (bad input files, bad flags, I/O),
//!   carrying the process exit code.
//! - `FitFailure` / `CurveError`: recoverable numerical conditions raised by the
//!   core. The pipeline never turns these into an `AppError`; an issuer whose
//!   curve is unavailable is skipped and reported instead.

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Invalid input to the curve function.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    /// The curve is only defined for strictly positive, finite durations.
    #[error("duration must be finite and > 0, got {duration}")]
    NonPositiveDuration { duration: f64 },

    /// The decay parameter appears as a divisor and must be finite and non-zero.
    #[error("decay must be finite and non-zero, got {decay}")]
    DegenerateDecay { decay: f64 },
}

/// Why a curve could not be fitted to an issuer's observations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitFailure {
    #[error("insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("invalid fit input: {0}")]
    InvalidInput(String),

    #[error("non-finite value during fit: {0}")]
    NonFinite(String),

    #[error("solver did not converge within {evaluations} evaluations (sse={sse:.4e})")]
    DidNotConverge { evaluations: usize, sse: f64 },

    #[error("fitted parameters are degenerate: {0}")]
    Degenerate(#[from] CurveError),
}
