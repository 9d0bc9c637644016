//! Stable Nelson–Siegel loadings.
//!
//! With `x = d / λ`:
//!
//! - `slope_loading(d, λ)     = (1 - exp(-x)) / x`
//! - `curvature_loading(d, λ) = slope_loading(d, λ) - exp(-x)`
//!
//! Numerical notes:
//! - For small `x`, `1 - exp(-x)` suffers from catastrophic cancellation.
//!   We use `expm1` (and a series fallback) to keep precision.
//! - The analytic limits as `x → 0` are `1` and `0` respectively, so both
//!   loadings are continuous across the small-x switch.
//! - Callers guarantee `d > 0` and `λ != 0`; a negative `λ` is allowed and gives
//!   growing exponentials (which may overflow to infinity for large `d/|λ|`).

/// Threshold below which we switch to a small-x series approximation.
const SMALL_X: f64 = 1e-6;

/// Slope loading `(1 - e^{-x}) / x`.
pub fn slope_loading(duration: f64, decay: f64) -> f64 {
    let x = duration / decay;

    if x.abs() < SMALL_X {
        // (1 - e^{-x}) / x ≈ 1 - x/2 + x^2/6
        return 1.0 - x / 2.0 + (x * x) / 6.0;
    }

    -(-x).exp_m1() / x
}

/// Curvature loading `(1 - e^{-x}) / x - e^{-x}`.
pub fn curvature_loading(duration: f64, decay: f64) -> f64 {
    let x = duration / decay;

    if x.abs() < SMALL_X {
        // f1 ≈ 1 - x/2 + x^2/6, e^{-x} ≈ 1 - x + x^2/2  =>  f1 - e^{-x} ≈ x/2 - x^2/3
        return x / 2.0 - (x * x) / 3.0;
    }

    slope_loading(duration, decay) - (-x).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn loadings_limit_near_zero() {
        let v1 = slope_loading(1e-12, 2.0);
        let v2 = curvature_loading(1e-12, 2.0);
        assert_abs_diff_eq!(v1, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(v2, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn loadings_match_closed_form() {
        for &decay in &[0.5, 1.0, 3.0] {
            for &d in &[0.1, 1.0, 4.0, 25.0] {
                let x: f64 = d / decay;
                let f1 = (1.0 - (-x).exp()) / x;
                let f2 = f1 - (-x).exp();
                assert_abs_diff_eq!(slope_loading(d, decay), f1, epsilon = 1e-12);
                assert_abs_diff_eq!(curvature_loading(d, decay), f2, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn loadings_continuous_across_series_switch() {
        let decay = 1.0;
        let below = slope_loading(0.999e-6, decay);
        let above = slope_loading(1.001e-6, decay);
        assert_abs_diff_eq!(below, above, epsilon = 1e-8);

        let below = curvature_loading(0.999e-6, decay);
        let above = curvature_loading(1.001e-6, decay);
        assert_abs_diff_eq!(below, above, epsilon = 1e-8);
    }

    #[test]
    fn negative_decay_stays_finite_for_moderate_x() {
        for &d in &[0.25, 1.0, 5.0, 20.0] {
            assert!(slope_loading(d, -10.0).is_finite());
            assert!(curvature_loading(d, -10.0).is_finite());
        }
    }
}
