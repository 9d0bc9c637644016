//! Nelson–Siegel spread curve.
//!
//! ```text
//! s(d) = β0 + β1 · f1(d/λ) + β2 · f2(d/λ)
//! f1(x) = (1 - e^{-x}) / x
//! f2(x) = f1(x) - e^{-x}
//! ```
//!
//! `evaluate` is the checked public entry point. The fitter works on inputs it
//! has already validated and uses `predict` / `fill_design_row` directly.

use crate::domain::CurveParams;
use crate::error::CurveError;
use crate::math::{curvature_loading, slope_loading};

/// Expected spread (bp) at `duration` for the given curve.
///
/// Rejects `duration <= 0` (the loadings divide by `d/λ`) and a zero or
/// non-finite decay.
pub fn evaluate(duration: f64, params: &CurveParams) -> Result<f64, CurveError> {
    check_params(params)?;
    check_duration(duration)?;
    Ok(predict(duration, params))
}

/// Evaluate the curve on a sequence of durations.
pub fn evaluate_many(durations: &[f64], params: &CurveParams) -> Result<Vec<f64>, CurveError> {
    check_params(params)?;
    durations
        .iter()
        .map(|&d| {
            check_duration(d)?;
            Ok(predict(d, params))
        })
        .collect()
}

/// Unchecked evaluation. Callers guarantee `duration > 0` and `decay != 0`.
pub fn predict(duration: f64, params: &CurveParams) -> f64 {
    let g1 = slope_loading(duration, params.decay);
    let g2 = curvature_loading(duration, params.decay);
    params.level + params.slope * g1 + params.curvature * g2
}

/// Fill a design row `[1, f1, f2]` for a fixed decay.
///
/// # Panics
/// Panics if `out` has fewer than 3 elements.
pub fn fill_design_row(duration: f64, decay: f64, out: &mut [f64]) {
    out[0] = 1.0;
    out[1] = slope_loading(duration, decay);
    out[2] = curvature_loading(duration, decay);
}

pub(crate) fn check_params(params: &CurveParams) -> Result<(), CurveError> {
    if !params.decay.is_finite() || params.decay == 0.0 {
        return Err(CurveError::DegenerateDecay { decay: params.decay });
    }
    Ok(())
}

fn check_duration(duration: f64) -> Result<(), CurveError> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(CurveError::NonPositiveDuration { duration });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn params() -> CurveParams {
        CurveParams {
            level: 150.0,
            slope: -80.0,
            curvature: 60.0,
            decay: 2.0,
        }
    }

    #[test]
    fn matches_three_term_decomposition() {
        let p = params();
        let d: f64 = 3.0;
        let x = d / p.decay;
        let e = (-x).exp();
        let term2 = p.slope * (1.0 - e) / x;
        let term3 = p.curvature * ((1.0 - e) / x - e);
        let expected = p.level + term2 + term3;
        assert_abs_diff_eq!(evaluate(d, &p).unwrap(), expected, epsilon = 1e-10);
    }

    #[test]
    fn long_end_tends_to_level() {
        let p = params();
        assert_abs_diff_eq!(evaluate(1e6, &p).unwrap(), p.level, epsilon = 1e-3);
    }

    #[test]
    fn rejects_non_positive_duration() {
        let p = params();
        assert_eq!(
            evaluate(0.0, &p),
            Err(CurveError::NonPositiveDuration { duration: 0.0 })
        );
        assert!(evaluate(-1.0, &p).is_err());
        assert!(evaluate(f64::NAN, &p).is_err());
    }

    #[test]
    fn rejects_zero_decay() {
        let p = CurveParams { decay: 0.0, ..params() };
        assert_eq!(evaluate(1.0, &p), Err(CurveError::DegenerateDecay { decay: 0.0 }));
    }

    #[test]
    fn evaluate_many_is_pointwise() {
        let p = params();
        let ds = [0.5, 1.0, 7.0];
        let many = evaluate_many(&ds, &p).unwrap();
        for (d, v) in ds.iter().zip(many) {
            assert_eq!(v, evaluate(*d, &p).unwrap());
        }
        assert!(evaluate_many(&[1.0, 0.0], &p).is_err());
    }

    #[test]
    fn dense_grid_is_finite_and_continuous() {
        let p = params();
        let step = 1e-3;
        let mut prev = evaluate(step, &p).unwrap();
        let mut d = 2.0 * step;
        while d <= 40.0 {
            let v = evaluate(d, &p).unwrap();
            assert!(v.is_finite());
            // Slope of the curve is bounded, so neighbours must stay close.
            assert!((v - prev).abs() < 1.0, "jump at d={d}: {prev} -> {v}");
            prev = v;
            d += step;
        }
    }

    proptest! {
        #[test]
        fn finite_for_positive_duration(
            d in 1e-6f64..50.0,
            level in -500.0f64..1500.0,
            slope in -1000.0f64..1000.0,
            curvature in -1000.0f64..1000.0,
            decay in 0.05f64..30.0,
        ) {
            let p = CurveParams { level, slope, curvature, decay };
            let v = evaluate(d, &p).unwrap();
            prop_assert!(v.is_finite());
        }
    }
}
