//! Linear least-squares building blocks.
//!
//! Two small solves show up in the curve fitter:
//!
//! ```text
//! minimize ‖y - X β‖²                   (loadings fixed, solve the betas)
//! (JᵀJ + μ D) δ = Jᵀ r                  (one damped Levenberg–Marquardt step)
//! ```
//!
//! Both systems are tiny (3–4 columns), so robustness matters more than speed.

use nalgebra::{DMatrix, DVector};

/// Solve a (possibly tall or short) least squares problem using SVD.
///
/// Underdetermined systems get the minimum-norm solution. Returns `None` if no
/// finite solution is found.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Loadings become nearly collinear for extreme decay values, so accept
    // progressively looser singular-value cutoffs before giving up.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the damped normal equations `(A + μ·diag(D)) δ = b`.
///
/// `A` must be symmetric positive semi-definite (it is `JᵀJ`). Cholesky is tried
/// first; an SVD solve is the fallback for numerically singular systems.
pub fn solve_damped(a: &DMatrix<f64>, b: &DVector<f64>, scale: &DVector<f64>, mu: f64) -> Option<DVector<f64>> {
    let mut damped = a.clone();
    for i in 0..damped.nrows() {
        damped[(i, i)] += mu * scale[i];
    }

    if let Some(chol) = damped.clone().cholesky() {
        let delta = chol.solve(b);
        if delta.iter().all(|v| v.is_finite()) {
            return Some(delta);
        }
    }

    solve_least_squares(&damped, b)
}
