//! Threshold outlier classification against a fitted curve.
//!
//! With `t = threshold_percent / 100` and `dev = spread - fitted`:
//!
//! - `BelowOwned`:   `dev < 0`, `dev < -t · fitted`, owned
//! - `AboveUnowned`: `dev > 0`, `dev >  t · fitted`, unowned
//!
//! The band is expressed as a multiple of `fitted` rather than a ratio
//! `dev / fitted`, so a curve crossing zero never divides by zero.

use crate::domain::{CurveParams, DeviationRecord, Direction, OutlierKind, OwnedBond};
use crate::error::CurveError;
use crate::models::evaluate;

/// Compare each observation against the curve.
///
/// Output order follows `observations`.
pub fn classify(
    observations: &[OwnedBond],
    params: &CurveParams,
    threshold_percent: f64,
) -> Result<Vec<DeviationRecord>, CurveError> {
    let t = threshold_percent / 100.0;
    observations
        .iter()
        .map(|obs| {
            let bond = &obs.bond;
            let fitted = evaluate(bond.duration, params)?;
            let deviation = bond.spread - fitted;
            let direction = if deviation > 0.0 { Direction::Above } else { Direction::Below };
            let band = t * fitted;

            let outlier = match direction {
                Direction::Below if obs.owned && deviation < -band => Some(OutlierKind::BelowOwned),
                Direction::Above if !obs.owned && deviation > band => Some(OutlierKind::AboveUnowned),
                _ => None,
            };

            Ok(DeviationRecord {
                id: bond.id.clone(),
                cusip: bond.cusip.clone(),
                duration: bond.duration,
                spread: bond.spread,
                owned: obs.owned,
                fitted,
                deviation,
                direction,
                outlier,
            })
        })
        .collect()
}

/// Owned bonds trading through the lower band (sell side).
pub fn below_owned(records: &[DeviationRecord]) -> Vec<&DeviationRecord> {
    of_kind(records, OutlierKind::BelowOwned)
}

/// Unowned bonds trading through the upper band (buy side).
pub fn above_unowned(records: &[DeviationRecord]) -> Vec<&DeviationRecord> {
    of_kind(records, OutlierKind::AboveUnowned)
}

fn of_kind(records: &[DeviationRecord], kind: OutlierKind) -> Vec<&DeviationRecord> {
    records.iter().filter(|r| r.outlier == Some(kind)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BondObservation;
    use crate::models::predict;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn flat(level: f64) -> CurveParams {
        CurveParams {
            level,
            slope: 0.0,
            curvature: 0.0,
            decay: 1.0,
        }
    }

    fn obs(cusip: &str, duration: f64, spread: f64, owned: bool) -> OwnedBond {
        let maturity = NaiveDate::from_ymd_opt(2031, 3, 1).unwrap();
        OwnedBond {
            bond: BondObservation {
                id: BondObservation::compose_id("XYZ", "5", maturity),
                cusip: cusip.to_string(),
                ticker: "XYZ".to_string(),
                coupon: "5".to_string(),
                maturity_date: maturity,
                duration,
                spread,
            },
            owned,
            strategies: None,
            held_quantity: None,
        }
    }

    #[test]
    fn labels_follow_band_and_ownership() {
        let curve = flat(100.0);
        let rows = vec![
            obs("A", 2.0, 90.0, true),   // 10% below, owned
            obs("B", 3.0, 90.0, false),  // below, unowned
            obs("C", 4.0, 110.0, false), // 10% above, unowned
            obs("D", 5.0, 110.0, true),  // above, owned
            obs("E", 6.0, 103.0, false), // inside the band
        ];
        let records = classify(&rows, &curve, 5.0).unwrap();

        let kinds: Vec<Option<OutlierKind>> = records.iter().map(|r| r.outlier).collect();
        assert_eq!(
            kinds,
            [Some(OutlierKind::BelowOwned), None, Some(OutlierKind::AboveUnowned), None, None]
        );
        assert_eq!(records[0].direction, Direction::Below);
        assert_eq!(records[2].direction, Direction::Above);
        assert_abs_diff_eq!(records[0].deviation, -10.0, epsilon = 1e-12);
        assert_eq!(below_owned(&records).len(), 1);
        assert_eq!(above_unowned(&records)[0].cusip, "C");
    }

    #[test]
    fn zero_deviation_is_below_but_never_an_outlier() {
        let records = classify(&[obs("A", 2.0, 100.0, true)], &flat(100.0), 0.0).unwrap();
        assert_eq!(records[0].direction, Direction::Below);
        assert_eq!(records[0].outlier, None);
    }

    #[test]
    fn zero_fitted_value_does_not_divide() {
        let records = classify(
            &[obs("A", 2.0, -1.0, true), obs("B", 3.0, 1.0, false)],
            &flat(0.0),
            5.0,
        )
        .unwrap();
        assert_eq!(records[0].outlier, Some(OutlierKind::BelowOwned));
        assert_eq!(records[1].outlier, Some(OutlierKind::AboveUnowned));
    }

    #[test]
    fn fitted_matches_the_model() {
        let curve = CurveParams {
            level: 150.0,
            slope: -50.0,
            curvature: 30.0,
            decay: 2.0,
        };
        let records = classify(&[obs("A", 7.5, 140.0, false)], &curve, 5.0).unwrap();
        assert_abs_diff_eq!(records[0].fitted, predict(7.5, &curve), epsilon = 1e-12);
    }

    #[test]
    fn degenerate_curve_is_an_error() {
        let err = classify(&[obs("A", 2.0, 90.0, true)], &CurveParams { decay: 0.0, ..flat(1.0) }, 5.0);
        assert!(err.is_err());
    }

    proptest! {
        #[test]
        fn outlier_count_never_grows_with_threshold(
            spreads in prop::collection::vec(50.0f64..250.0, 1..30),
            owned_mask in prop::collection::vec(any::<bool>(), 30),
            t1 in 0.0f64..30.0,
            dt in 0.0f64..30.0,
        ) {
            let rows: Vec<OwnedBond> = spreads
                .iter()
                .enumerate()
                .map(|(i, &s)| obs(&format!("C{i}"), 1.0 + i as f64, s, owned_mask[i]))
                .collect();
            let curve = flat(150.0);
            let low = classify(&rows, &curve, t1).unwrap();
            let high = classify(&rows, &curve, t1 + dt).unwrap();
            prop_assert!(below_owned(&high).len() <= below_owned(&low).len());
            prop_assert!(above_unowned(&high).len() <= above_unowned(&low).len());
        }
    }
}
