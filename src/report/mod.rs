//! Reporting: fixed-width terminal tables for screen results.

pub mod format;

pub use format::*;
