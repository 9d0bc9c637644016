//! Sell/buy pair enumeration inside one issuer.
//!
//! A pair `(sell, buy)` is kept iff the buy is strictly longer and the spread
//! pickup per year of duration extension beats `min_ratio`:
//!
//! ```text
//! ratio = (buy.spread - sell.spread) / (buy.duration - sell.duration) > min_ratio
//! ```
//!
//! Candidates are emitted in `sells × buys` order; `sort_candidates` puts them
//! in display order.

use crate::domain::{DeviationRecord, OutlierKind, OwnedBond, TradeCandidate, TradeLeg};
use crate::math::round2;

/// A bond offered to the pair generator.
#[derive(Debug, Clone, PartialEq)]
pub struct LegSource {
    pub leg: TradeLeg,
    /// Strategy labels of the holding, shown when this bond is sold.
    pub strategies: Option<String>,
}

impl LegSource {
    pub fn from_owned(obs: &OwnedBond, deviation: Option<f64>) -> Self {
        Self {
            leg: TradeLeg {
                id: obs.bond.id.clone(),
                cusip: obs.bond.cusip.clone(),
                duration: obs.bond.duration,
                spread: obs.bond.spread,
                deviation,
            },
            strategies: obs.strategies.clone(),
        }
    }
}

/// Which bonds the relaxed pairing may buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyUniverse {
    /// Every bond of the issuer, owned or not.
    All,
    /// Only bonds not currently held.
    Unowned,
}

/// Cross every sell with every buy and keep the pairs passing the filters.
pub fn generate(ticker: &str, sells: &[LegSource], buys: &[LegSource], min_ratio: f64) -> Vec<TradeCandidate> {
    let mut out = Vec::new();
    for sell in sells {
        for buy in buys {
            let duration_diff = buy.leg.duration - sell.leg.duration;
            if !(duration_diff > 0.0) {
                continue;
            }
            let spread_diff = buy.leg.spread - sell.leg.spread;
            let ratio = spread_diff / duration_diff;
            if !(ratio > min_ratio) {
                continue;
            }
            let deviation_diff = match (buy.leg.deviation, sell.leg.deviation) {
                (Some(b), Some(s)) => Some(b - s),
                _ => None,
            };
            out.push(TradeCandidate {
                ticker: ticker.to_string(),
                sell: sell.leg.clone(),
                buy: buy.leg.clone(),
                sell_strategies: sell.strategies.clone(),
                ratio,
                spread_diff,
                duration_diff,
                deviation_diff,
            });
        }
    }
    out
}

/// Pairs owned bonds below the curve with unowned bonds above it.
///
/// `records` must be the classification of `observations`, in the same order.
pub fn outlier_pairs(
    ticker: &str,
    observations: &[OwnedBond],
    records: &[DeviationRecord],
    min_ratio: f64,
) -> Vec<TradeCandidate> {
    let mut sells = Vec::new();
    let mut buys = Vec::new();
    for (obs, record) in observations.iter().zip(records) {
        match record.outlier {
            Some(OutlierKind::BelowOwned) => sells.push(LegSource::from_owned(obs, Some(record.deviation))),
            Some(OutlierKind::AboveUnowned) => buys.push(LegSource::from_owned(obs, Some(record.deviation))),
            None => {}
        }
    }
    generate(ticker, &sells, &buys, min_ratio)
}

/// Pairs every owned bond with every eligible buy; no curve filter.
///
/// Deviations are attached when a classification is available.
pub fn relaxed_pairs(
    ticker: &str,
    observations: &[OwnedBond],
    records: Option<&[DeviationRecord]>,
    universe: BuyUniverse,
    min_ratio: f64,
) -> Vec<TradeCandidate> {
    let deviation = |i: usize| records.and_then(|r| r.get(i)).map(|r| r.deviation);

    let mut sells = Vec::new();
    let mut buys = Vec::new();
    for (i, obs) in observations.iter().enumerate() {
        let source = LegSource::from_owned(obs, deviation(i));
        if obs.owned {
            sells.push(source.clone());
        }
        if universe == BuyUniverse::All || !obs.owned {
            buys.push(source);
        }
    }
    generate(ticker, &sells, &buys, min_ratio)
}

/// Sort by sell id, then ratio at display precision.
///
/// Ties on the displayed key fall back to the exact ratio, the buy id and both
/// cusips, so the order never depends on the order bonds arrived in.
pub fn sort_candidates(candidates: &mut [TradeCandidate]) {
    candidates.sort_by(|a, b| {
        a.sell
            .id
            .cmp(&b.sell.id)
            .then_with(|| round2(a.ratio).total_cmp(&round2(b.ratio)))
            .then_with(|| a.ratio.total_cmp(&b.ratio))
            .then_with(|| a.buy.id.cmp(&b.buy.id))
            .then_with(|| a.sell.cusip.cmp(&b.sell.cusip))
            .then_with(|| a.buy.cusip.cmp(&b.buy.cusip))
    });
}
