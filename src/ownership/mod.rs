//! Ownership resolution: position rows → owned/unowned flag per bond.
//!
//! Steps:
//! 1. drop positions in excluded (non-tradable) strategy categories
//! 2. aggregate per `(cusip, desk)`: sum quantities, collect strategy labels
//! 3. keep aggregates strictly above the minimum holding, if one is set
//! 4. collapse the surviving aggregates per cusip
//! 5. left-join bonds on cusip; unmatched bonds are unowned, never dropped
//!
//! Maps are `BTreeMap`s so every derived label is produced in a stable order.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{BondObservation, OwnedBond, PositionRow, SegmentRules};

/// Which positions count as holdings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnershipPolicy {
    /// Strategy labels removed before aggregation (case-insensitive).
    pub excluded_strategies: Vec<String>,
    /// An aggregate must be strictly greater than this to count.
    pub min_holding: Option<f64>,
}

impl OwnershipPolicy {
    pub fn from_rules(rules: &SegmentRules) -> Self {
        Self {
            excluded_strategies: rules.excluded_strategies.clone(),
            min_holding: rules.min_holding,
        }
    }

    fn is_excluded(&self, strategy: &str) -> bool {
        let strategy = strategy.trim();
        self.excluded_strategies
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(strategy))
    }
}

/// Aggregated holding of one instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Holding {
    pub quantity: f64,
    pub strategies: BTreeSet<String>,
}

impl Holding {
    /// Sorted, comma-joined strategy labels (`None` when there are none).
    pub fn strategy_label(&self) -> Option<String> {
        if self.strategies.is_empty() {
            return None;
        }
        Some(self.strategies.iter().cloned().collect::<Vec<_>>().join(", "))
    }
}

/// Aggregate positions into `cusip → Holding` under the given policy.
pub fn aggregate_positions(positions: &[PositionRow], policy: &OwnershipPolicy) -> BTreeMap<String, Holding> {
    let mut per_desk: BTreeMap<(&str, &str), Holding> = BTreeMap::new();
    for row in positions {
        if policy.is_excluded(&row.strategy) {
            continue;
        }
        let entry = per_desk.entry((row.cusip.as_str(), row.desk.as_str())).or_default();
        // Missing quantities count as zero, like a skipped NaN in a sum.
        entry.quantity += row.quantity.filter(|q| q.is_finite()).unwrap_or(0.0);
        let strategy = row.strategy.trim();
        if !strategy.is_empty() {
            entry.strategies.insert(strategy.to_string());
        }
    }

    let mut out: BTreeMap<String, Holding> = BTreeMap::new();
    for ((cusip, _desk), holding) in per_desk {
        if let Some(min) = policy.min_holding {
            if !(holding.quantity > min) {
                continue;
            }
        }
        let entry = out.entry(cusip.to_string()).or_default();
        entry.quantity += holding.quantity;
        entry.strategies.extend(holding.strategies);
    }
    out
}

/// Attach the owned flag to every bond (one output row per input bond, same order).
pub fn resolve(bonds: &[BondObservation], positions: &[PositionRow], policy: &OwnershipPolicy) -> Vec<OwnedBond> {
    let holdings = aggregate_positions(positions, policy);
    bonds
        .iter()
        .map(|bond| {
            let holding = holdings.get(&bond.cusip);
            OwnedBond {
                bond: bond.clone(),
                owned: holding.is_some(),
                strategies: holding.and_then(Holding::strategy_label),
                held_quantity: holding.map(|h| h.quantity),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Segment;
    use chrono::NaiveDate;

    fn bond(cusip: &str) -> BondObservation {
        let maturity = NaiveDate::from_ymd_opt(2030, 6, 15).unwrap();
        BondObservation {
            id: BondObservation::compose_id("ABC", "4.5", maturity),
            cusip: cusip.to_string(),
            ticker: "ABC".to_string(),
            coupon: "4.5".to_string(),
            maturity_date: maturity,
            duration: 4.0,
            spread: 120.0,
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

    fn ig() -> OwnershipPolicy {
        OwnershipPolicy::from_rules(&SegmentRules::for_segment(Segment::Ig))
    }

    fn hy() -> OwnershipPolicy {
        OwnershipPolicy::from_rules(&SegmentRules::for_segment(Segment::Hy))
    }

    #[test]
    fn summed_rows_above_threshold_are_owned() {
        let positions = vec![
            position("C1", "DESK1", "CORE", 1_200_000.0),
            position("C1", "DESK1", "CORE", 900_000.0),
        ];
        let out = resolve(&[bond("C1")], &positions, &ig());
        assert!(out[0].owned);
        assert_eq!(out[0].held_quantity, Some(2_100_000.0));
        assert_eq!(out[0].strategies.as_deref(), Some("CORE"));
    }

    #[test]
    fn summed_rows_below_threshold_are_unowned() {
        let positions = vec![
            position("C1", "DESK1", "CORE", 1_000_000.0),
            position("C1", "DESK1", "CORE", 900_000.0),
        ];
        let out = resolve(&[bond("C1")], &positions, &ig());
        assert!(!out[0].owned);
        assert_eq!(out[0].held_quantity, None);
    }

    #[test]
    fn threshold_is_strict() {
        let positions = vec![position("C1", "DESK1", "CORE", 2_000_000.0)];
        let out = resolve(&[bond("C1")], &positions, &ig());
        assert!(!out[0].owned);
    }

    #[test]
    fn threshold_applies_per_desk() {
        let positions = vec![
            position("C1", "DESK1", "CORE", 1_200_000.0),
            position("C1", "DESK2", "CORE", 900_000.0),
        ];
        let out = resolve(&[bond("C1")], &positions, &ig());
        assert!(!out[0].owned);
    }

    #[test]
    fn excluded_strategies_do_not_count() {
        let positions = vec![
            position("C1", "DESK1", "PLEDGE", 5_000_000.0),
            position("C1", "DESK1", "ins", 5_000_000.0),
        ];
        let out = resolve(&[bond("C1")], &positions, &ig());
        assert!(!out[0].owned);
    }

    #[test]
    fn strategy_labels_are_sorted_and_unique() {
        let positions = vec![
            position("C1", "DESK1", "TOTAL", 1_500_000.0),
            position("C1", "DESK1", "CORE", 1_000_000.0),
            position("C1", "DESK1", "TOTAL", 100_000.0),
            position("C1", "DESK2", "ALPHA", 3_000_000.0),
        ];
        let out = resolve(&[bond("C1")], &positions, &ig());
        assert!(out[0].owned);
        assert_eq!(out[0].strategies.as_deref(), Some("ALPHA, CORE, TOTAL"));
        assert_eq!(out[0].held_quantity, Some(5_600_000.0));
    }

    #[test]
    fn high_yield_counts_any_matched_position() {
        let mut row = position("C1", "DESK1", "MODEL", 0.0);
        row.quantity = None;
        let out = resolve(&[bond("C1"), bond("C2")], &[row], &hy());
        assert!(out[0].owned);
        assert!(!out[1].owned);
    }

    #[test]
    fn left_join_keeps_every_bond_in_order() {
        let bonds = vec![bond("C3"), bond("C1"), bond("C2")];
        let positions = vec![position("C1", "DESK1", "CORE", 3_000_000.0), position("ZZ", "DESK1", "CORE", 9e6)];
        let out = resolve(&bonds, &positions, &ig());
        let cusips: Vec<&str> = out.iter().map(|o| o.bond.cusip.as_str()).collect();
        assert_eq!(cusips, ["C3", "C1", "C2"]);
        let owned: Vec<bool> = out.iter().map(|o| o.owned).collect();
        assert_eq!(owned, [false, true, false]);
    }
}
