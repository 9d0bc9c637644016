//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - segment constants (`Segment`, `SegmentRules`)
//! - feed records (`BondObservation`, `PositionRow`) and the enriched `OwnedBond`
//! - curve outputs (`CurveParams`, `CurveFit`, `DeviationRecord`)
//! - trade outputs (`TradeCandidate`, `TradeLeg`)

pub mod types;

pub use types::*;
