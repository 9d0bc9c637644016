//! Levenberg–Marquardt minimization of a sum of squared residuals.
//!
//! The objective is supplied as a closure returning the residual vector (or
//! `None` when the parameters are outside the function's domain, e.g. an
//! exponential overflowed). The Jacobian is taken by central differences, so
//! every residual call counts against the evaluation budget.
//!
//! Each iteration solves the Marquardt-scaled damped system
//!
//! ```text
//! (JᵀJ + μ·diag(JᵀJ)) δ = -Jᵀ r
//! ```
//!
//! accepting the step only if it lowers the SSE (μ shrinks on success, grows on
//! failure). Convergence is only declared on near Gauss–Newton steps (`μ ≤ 1`),
//! so a heavily damped crawl is never mistaken for a minimum.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_damped;

/// Relative finite-difference step (cube root of machine epsilon).
const FD_STEP: f64 = 6.055_454_452_393_343e-6;

/// Largest damping still treated as a Gauss–Newton-like step for convergence tests.
const GN_DAMPING: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct LmOptions {
    /// Maximum number of residual evaluations (Jacobian columns included).
    pub max_evaluations: usize,
    /// Stop when a near Gauss–Newton step reduces the SSE by less than this fraction.
    pub ftol: f64,
    /// Stop when a near Gauss–Newton step is this small relative to the parameters.
    pub xtol: f64,
    /// Stop as soon as the SSE is at or below this absolute level.
    pub sse_floor: f64,
    pub initial_damping: f64,
    pub damping_factor: f64,
    /// Damping above which no descent direction is considered reachable.
    pub max_damping: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_evaluations: 10_000,
            ftol: 1.49012e-8,
            xtol: 1.49012e-8,
            sse_floor: 0.0,
            initial_damping: 1e-3,
            damping_factor: 10.0,
            max_damping: 1e16,
        }
    }
}

/// Why the solver stopped successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    SmallReduction,
    SmallStep,
    ResidualFloor,
    ZeroGradient,
    /// Every damped step was rejected up to `max_damping`.
    Stalled,
}

#[derive(Debug, Clone)]
pub struct LmReport {
    pub params: Vec<f64>,
    pub sse: f64,
    pub evaluations: usize,
    pub iterations: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LmError {
    /// The residuals at the starting point are undefined or non-finite.
    NonFiniteStart,
    /// The Jacobian could not be formed at the current point.
    NonFiniteJacobian { params: Vec<f64> },
    BudgetExhausted { evaluations: usize, sse: f64 },
}

/// Minimize `Σ r_i(p)²` starting from `start`.
pub fn minimize<F>(mut residuals: F, start: &[f64], opts: &LmOptions) -> Result<LmReport, LmError>
where
    F: FnMut(&[f64]) -> Option<DVector<f64>>,
{
    let m = start.len();
    let mut params = start.to_vec();
    let mut evaluations = 1usize;
    let mut r = finite(residuals(&params)).ok_or(LmError::NonFiniteStart)?;
    let mut sse = r.norm_squared();
    let mut mu = opts.initial_damping;
    let mut iterations = 0usize;

    let done = |params: Vec<f64>, sse: f64, evaluations: usize, iterations: usize, termination: Termination| {
        Ok(LmReport {
            params,
            sse,
            evaluations,
            iterations,
            termination,
        })
    };

    loop {
        if sse <= opts.sse_floor {
            return done(params, sse, evaluations, iterations, Termination::ResidualFloor);
        }
        if evaluations + 2 * m > opts.max_evaluations {
            return Err(LmError::BudgetExhausted { evaluations, sse });
        }

        let jac = jacobian(&mut residuals, &params, &r, &mut evaluations).ok_or_else(|| {
            LmError::NonFiniteJacobian {
                params: params.clone(),
            }
        })?;

        let a = jac.transpose() * &jac;
        let g = jac.transpose() * &r;
        if g.amax() == 0.0 {
            return done(params, sse, evaluations, iterations, Termination::ZeroGradient);
        }

        let max_diag = a.diagonal().max();
        let scale = a
            .diagonal()
            .map(|d| d.max(max_diag * 1e-12).max(f64::MIN_POSITIVE));
        let rhs = -g;

        // Inner loop: raise the damping until a step lowers the SSE.
        loop {
            if evaluations >= opts.max_evaluations {
                return Err(LmError::BudgetExhausted { evaluations, sse });
            }

            let Some(delta) = solve_damped(&a, &rhs, &scale, mu) else {
                mu *= opts.damping_factor;
                if mu > opts.max_damping {
                    return done(params, sse, evaluations, iterations, Termination::Stalled);
                }
                continue;
            };

            let trial: Vec<f64> = params.iter().zip(delta.iter()).map(|(p, d)| p + d).collect();
            evaluations += 1;

            match finite(residuals(&trial)) {
                Some(trial_r) if trial_r.norm_squared() < sse => {
                    let trial_sse = trial_r.norm_squared();
                    let reduction = (sse - trial_sse) / sse;
                    let step_norm = delta.norm();
                    let params_norm = params.iter().map(|p| p * p).sum::<f64>().sqrt();
                    let near_gauss_newton = mu <= GN_DAMPING;

                    params = trial;
                    r = trial_r;
                    sse = trial_sse;
                    mu = (mu / opts.damping_factor).max(1e-15);
                    iterations += 1;

                    if near_gauss_newton && reduction <= opts.ftol {
                        return done(params, sse, evaluations, iterations, Termination::SmallReduction);
                    }
                    if near_gauss_newton && step_norm <= opts.xtol * (params_norm + opts.xtol) {
                        return done(params, sse, evaluations, iterations, Termination::SmallStep);
                    }
                    break;
                }
                _ => {
                    mu *= opts.damping_factor;
                    if mu > opts.max_damping {
                        return done(params, sse, evaluations, iterations, Termination::Stalled);
                    }
                }
            }
        }
    }
}

fn finite(r: Option<DVector<f64>>) -> Option<DVector<f64>> {
    r.filter(|v| v.iter().all(|x| x.is_finite()))
}

/// Central-difference Jacobian of the residual vector; one-sided where a bump
/// leaves the function's domain.
fn jacobian<F>(residuals: &mut F, params: &[f64], r0: &DVector<f64>, evaluations: &mut usize) -> Option<DMatrix<f64>>
where
    F: FnMut(&[f64]) -> Option<DVector<f64>>,
{
    let n = r0.len();
    let m = params.len();
    let mut jac = DMatrix::<f64>::zeros(n, m);
    let mut bumped = params.to_vec();

    for j in 0..m {
        let h = FD_STEP * params[j].abs().max(1.0);

        bumped[j] = params[j] + h;
        let up = finite(residuals(&bumped));
        bumped[j] = params[j] - h;
        let down = finite(residuals(&bumped));
        bumped[j] = params[j];
        *evaluations += 2;

        let column = match (up, down) {
            (Some(u), Some(d)) => (u - d) / (2.0 * h),
            (Some(u), None) => (u - r0) / h,
            (None, Some(d)) => (r0 - d) / h,
            (None, None) => return None,
        };
        jac.set_column(j, &column);
    }

    Some(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn fits_exponential_decay() {
        // y = 3 e^{-0.7 t}
        let t: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = t.iter().map(|&t| 3.0 * (-0.7 * t).exp()).collect();

        let report = minimize(
            |p| {
                Some(DVector::from_iterator(
                    t.len(),
                    t.iter().zip(&y).map(|(&t, &y)| y - p[0] * (-p[1] * t).exp()),
                ))
            },
            &[1.0, 0.1],
            &LmOptions::default(),
        )
        .unwrap();

        assert_abs_diff_eq!(report.params[0], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(report.params[1], 0.7, epsilon = 1e-6);
        assert!(report.sse < 1e-12);
    }

    #[test]
    fn undefined_start_is_an_error() {
        let err = minimize(|_| None, &[1.0], &LmOptions::default()).unwrap_err();
        assert_eq!(err, LmError::NonFiniteStart);
    }

    #[test]
    fn tiny_budget_is_reported() {
        let opts = LmOptions {
            max_evaluations: 3,
            ..LmOptions::default()
        };
        let err = minimize(
            |p| Some(DVector::from_row_slice(&[p[0] - 5.0, p[1] + 2.0])),
            &[0.0, 0.0],
            &opts,
        )
        .unwrap_err();
        assert!(matches!(err, LmError::BudgetExhausted { .. }));
    }

    #[test]
    fn skips_steps_that_leave_the_domain() {
        // Residual undefined for p <= 0; minimum at p = 0.5.
        let report = minimize(
            |p| {
                if p[0] <= 0.0 {
                    None
                } else {
                    Some(DVector::from_row_slice(&[p[0].ln() - 0.5f64.ln()]))
                }
            },
            &[4.0],
            &LmOptions::default(),
        )
        .unwrap();
        assert_abs_diff_eq!(report.params[0], 0.5, epsilon = 1e-6);
    }
}
