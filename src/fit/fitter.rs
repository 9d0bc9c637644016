//! Nonlinear least-squares fit of the Nelson–Siegel curve to one issuer.
//!
//! Objective: `Σ (s_i - s(d_i; β0, β1, β2, λ))²` over all four parameters.
//!
//! The curve is linear in the betas once `λ` is fixed, so the solve runs in two
//! stages:
//!
//! 1. **Separable stage.** For a given `λ` the betas are the exact linear least
//!    squares solution, leaving a one-dimensional Levenberg–Marquardt problem in
//!    `λ` started from the fixed seed `λ = 1.0`. This avoids the stiff start of
//!    the joint problem (tiny seed betas make the `λ` direction nearly flat).
//! 2. **Joint polish.** Levenberg–Marquardt on all four parameters from the
//!    stage-1 point, sharing the remaining evaluation budget.
//!
//! If the separable stage fails (linear solve impossible, undefined Jacobian or
//! budget spent), the joint solver starts from the full fixed seed
//! `(0.01, -0.01, 0.01, 1.0)` with whatever budget remains.
//!
//! Every failure is returned as a `FitFailure`; nothing here panics on data.

use nalgebra::{DMatrix, DVector};

use crate::domain::{CurveFit, CurveParams};
use crate::error::FitFailure;
use crate::math::{LmError, LmOptions, LmReport, minimize, solve_least_squares};
use crate::models::model::check_params;
use crate::models::{fill_design_row, predict};

/// Fewest observations a fit is attempted on.
pub const MIN_FIT_OBSERVATIONS: usize = 2;

/// SSE floor relative to `Σ s_i²`: below this the fit is exact to machine precision.
const SSE_FLOOR_REL: f64 = 1e-26;

/// Solver budget and tolerances.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Total objective evaluations across both stages.
    pub max_evaluations: usize,
    pub ftol: f64,
    pub xtol: f64,
    /// Fit the decay with exact betas before the joint polish.
    pub separable: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            separable: true,
        }
    }
}

/// Fit the curve and return its parameters.
pub fn fit(durations: &[f64], spreads: &[f64]) -> Result<CurveParams, FitFailure> {
    fit_curve(durations, spreads, &SolverOptions::default()).map(|f| f.params)
}

/// Fit the curve and return parameters plus fit diagnostics.
pub fn fit_curve(durations: &[f64], spreads: &[f64], opts: &SolverOptions) -> Result<CurveFit, FitFailure> {
    validate_inputs(durations, spreads)?;

    let n = durations.len();
    let y = DVector::from_column_slice(spreads);
    let lm = LmOptions {
        max_evaluations: opts.max_evaluations,
        ftol: opts.ftol,
        xtol: opts.xtol,
        sse_floor: SSE_FLOOR_REL * y.norm_squared().max(1.0),
        ..LmOptions::default()
    };

    let seed = CurveParams::INITIAL_GUESS;

    let stage = if opts.separable {
        separable_stage(durations, &y, seed.decay, &lm)
    } else {
        Err((LmError::NonFiniteStart, 0))
    };
    let (start, mut sse, mut evaluations, stage_error) = match stage {
        Ok((start, stage_sse, used)) => (start, stage_sse, used, None),
        Err((e, used)) => (seed, f64::INFINITY, used, opts.separable.then_some(e)),
    };

    let mut params = start;
    let remaining = opts.max_evaluations.saturating_sub(evaluations);
    if sse > lm.sse_floor && remaining > 0 {
        let joint_opts = LmOptions {
            max_evaluations: remaining,
            ..lm.clone()
        };
        match minimize(|p| joint_residuals(durations, spreads, p), &start.to_array(), &joint_opts) {
            Ok(LmReport {
                params: p,
                sse: joint_sse,
                evaluations: used,
                termination,
                ..
            }) => {
                evaluations += used;
                tracing::trace!(?termination, sse = joint_sse, evaluations = used, "joint stage done");
                if joint_sse < sse {
                    params = CurveParams::from_slice(&p);
                    sse = joint_sse;
                }
            }
            // A converged separable fit is already a stationary point of the
            // full objective; the joint stage may only improve on it.
            Err(e) if sse.is_finite() => {
                tracing::debug!(error = ?e, "joint stage failed; keeping separable fit");
                if let LmError::BudgetExhausted { evaluations: used, .. } = e {
                    evaluations += used;
                }
            }
            Err(e) => return Err(to_failure(e)),
        }
    }

    // The joint stage never ran, so the separable failure is the answer.
    if let (false, Some(e)) = (sse.is_finite(), stage_error) {
        return Err(to_failure(e));
    }
    if !params.is_finite() || !sse.is_finite() {
        return Err(FitFailure::NonFinite(format!("fitted parameters {params:?}")));
    }
    check_params(&params)?;

    Ok(CurveFit {
        params,
        sse,
        rmse: (sse / n as f64).sqrt(),
        n,
        evaluations,
    })
}

/// Fit the decay with the betas solved exactly at every step.
///
/// On failure returns the error with the evaluations spent; the caller falls
/// back to the joint solve from the full seed.
fn separable_stage(
    durations: &[f64],
    y: &DVector<f64>,
    seed_decay: f64,
    lm: &LmOptions,
) -> Result<(CurveParams, f64, usize), (LmError, usize)> {
    projected_residuals(durations, y, seed_decay).ok_or((LmError::NonFiniteStart, 1))?;

    let stage1 = minimize(
        |p| projected_residuals(durations, y, p[0]).map(|(r, _)| r),
        &[seed_decay],
        lm,
    )
    .map_err(|e| {
        tracing::debug!(error = ?e, "separable stage failed; joint solve from the seed");
        let used = match e {
            LmError::BudgetExhausted { evaluations, .. } => evaluations,
            _ => 1,
        };
        (e, used)
    })?;

    let decay = stage1.params[0];
    let (_, betas) = projected_residuals(durations, y, decay).ok_or_else(|| {
        (
            LmError::NonFiniteJacobian { params: vec![decay] },
            stage1.evaluations,
        )
    })?;
    tracing::trace!(decay, sse = stage1.sse, evaluations = stage1.evaluations, "separable stage done");
    Ok((
        CurveParams {
            level: betas[0],
            slope: betas[1],
            curvature: betas[2],
            decay,
        },
        stage1.sse,
        stage1.evaluations + 1,
    ))
}

fn validate_inputs(durations: &[f64], spreads: &[f64]) -> Result<(), FitFailure> {
    if durations.len() != spreads.len() {
        return Err(FitFailure::InvalidInput(format!(
            "{} durations but {} spreads",
            durations.len(),
            spreads.len()
        )));
    }
    if durations.len() < MIN_FIT_OBSERVATIONS {
        return Err(FitFailure::InsufficientData {
            required: MIN_FIT_OBSERVATIONS,
            actual: durations.len(),
        });
    }
    if let Some(d) = durations.iter().find(|d| !d.is_finite() || **d <= 0.0) {
        return Err(FitFailure::InvalidInput(format!("duration {d} is not finite and > 0")));
    }
    if let Some(s) = spreads.iter().find(|s| !s.is_finite()) {
        return Err(FitFailure::InvalidInput(format!("spread {s} is not finite")));
    }
    Ok(())
}

/// Residuals and betas of the linear fit for a fixed decay.
fn projected_residuals(durations: &[f64], y: &DVector<f64>, decay: f64) -> Option<(DVector<f64>, DVector<f64>)> {
    if !decay.is_finite() || decay == 0.0 {
        return None;
    }

    let n = durations.len();
    let mut x = DMatrix::<f64>::zeros(n, 3);
    let mut row = [0.0; 3];
    for (i, &d) in durations.iter().enumerate() {
        fill_design_row(d, decay, &mut row);
        if row.iter().any(|v| !v.is_finite()) {
            return None;
        }
        for j in 0..3 {
            x[(i, j)] = row[j];
        }
    }

    let betas = solve_least_squares(&x, y)?;
    let residuals = y - &x * &betas;
    Some((residuals, betas))
}

fn joint_residuals(durations: &[f64], spreads: &[f64], p: &[f64]) -> Option<DVector<f64>> {
    let params = CurveParams::from_slice(p);
    if !params.decay.is_finite() || params.decay == 0.0 {
        return None;
    }
    Some(DVector::from_iterator(
        durations.len(),
        durations.iter().zip(spreads).map(|(&d, &s)| s - predict(d, &params)),
    ))
}

fn to_failure(e: LmError) -> FitFailure {
    match e {
        LmError::NonFiniteStart => FitFailure::NonFinite("residuals undefined at the starting point".to_string()),
        LmError::NonFiniteJacobian { params } => {
            FitFailure::NonFinite(format!("jacobian undefined at {params:?}"))
        }
        LmError::BudgetExhausted { evaluations, sse } => FitFailure::DidNotConverge { evaluations, sse },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn known() -> CurveParams {
        CurveParams {
            level: 120.0,
            slope: -60.0,
            curvature: 40.0,
            decay: 1.5,
        }
    }

    fn grid() -> Vec<f64> {
        (1..=30).map(|i| i as f64 * 0.5).collect()
    }

    #[test]
    fn recovers_known_curve_from_exact_spreads() {
        let truth = known();
        let durations = grid();
        let spreads: Vec<f64> = durations.iter().map(|&d| predict(d, &truth)).collect();

        let fit = fit_curve(&durations, &spreads, &SolverOptions::default()).unwrap();

        for (&d, &s) in durations.iter().zip(&spreads) {
            assert_abs_diff_eq!(predict(d, &fit.params), s, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(fit.params.level, truth.level, epsilon = 1e-3);
        assert_abs_diff_eq!(fit.params.slope, truth.slope, epsilon = 1e-3);
        assert_abs_diff_eq!(fit.params.curvature, truth.curvature, epsilon = 1e-3);
        assert_abs_diff_eq!(fit.params.decay, truth.decay, epsilon = 1e-3);
        assert!(fit.evaluations <= 10_000);
    }

    #[test]
    fn fitting_twice_is_bit_identical() {
        let durations = grid();
        let spreads: Vec<f64> = durations
            .iter()
            .enumerate()
            .map(|(i, &d)| predict(d, &known()) + if i % 2 == 0 { 3.0 } else { -2.5 })
            .collect();

        let a = fit(&durations, &spreads).unwrap();
        let b = fit(&durations, &spreads).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn noisy_fit_is_close_to_the_data() {
        let durations = grid();
        let noise = [4.0, -3.0, 1.5, -4.5, 2.0, 0.5];
        let spreads: Vec<f64> = durations
            .iter()
            .enumerate()
            .map(|(i, &d)| predict(d, &known()) + noise[i % noise.len()])
            .collect();

        let fit = fit_curve(&durations, &spreads, &SolverOptions::default()).unwrap();
        assert!(fit.rmse.is_finite());
        // Least squares can only do better than the generating curve.
        let truth_sse: f64 = noise.iter().cycle().take(durations.len()).map(|e| e * e).sum();
        assert!(fit.sse <= truth_sse + 1e-6, "sse={} truth={truth_sse}", fit.sse);
    }

    #[test]
    fn two_observations_are_interpolated() {
        let fit = fit_curve(&[2.0, 5.0], &[100.0, 180.0], &SolverOptions::default()).unwrap();
        assert_abs_diff_eq!(predict(2.0, &fit.params), 100.0, epsilon = 1e-6);
        assert_abs_diff_eq!(predict(5.0, &fit.params), 180.0, epsilon = 1e-6);
    }

    #[test]
    fn single_observation_is_insufficient() {
        let err = fit(&[3.0], &[120.0]).unwrap_err();
        assert_eq!(
            err,
            FitFailure::InsufficientData {
                required: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = fit(&[1.0, 2.0, 3.0], &[100.0, 110.0]).unwrap_err();
        assert!(matches!(err, FitFailure::InvalidInput(_)));
    }

    #[test]
    fn zero_duration_is_rejected() {
        let err = fit(&[0.0, 2.0, 3.0], &[100.0, 110.0, 120.0]).unwrap_err();
        assert!(matches!(err, FitFailure::InvalidInput(_)));
    }

    #[test]
    fn joint_solve_from_the_seed_still_fits() {
        let truth = CurveParams {
            decay: CurveParams::INITIAL_GUESS.decay,
            ..known()
        };
        let durations = grid();
        let spreads: Vec<f64> = durations.iter().map(|&d| predict(d, &truth)).collect();
        let opts = SolverOptions {
            separable: false,
            ..SolverOptions::default()
        };
        let fit = fit_curve(&durations, &spreads, &opts).unwrap();

        // At least as good as a flat curve through the mean.
        let mean = spreads.iter().sum::<f64>() / spreads.len() as f64;
        let flat_sse: f64 = spreads.iter().map(|s| (s - mean).powi(2)).sum();
        assert!(fit.sse <= flat_sse, "sse={} flat={flat_sse}", fit.sse);
        assert!(fit.rmse < 1.0, "rmse={}", fit.rmse);
    }

    #[test]
    fn exhausted_budget_is_a_fit_failure() {
        let durations = grid();
        let spreads: Vec<f64> = durations.iter().map(|&d| predict(d, &known())).collect();
        let opts = SolverOptions {
            max_evaluations: 3,
            ..SolverOptions::default()
        };
        let err = fit_curve(&durations, &spreads, &opts).unwrap_err();
        assert!(matches!(err, FitFailure::DidNotConverge { .. }));
    }
}
