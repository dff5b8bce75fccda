//! Least squares building blocks.
//!
//! Every regression in this crate (main fits, auxiliary diagnostic regressions,
//! Chow segments, polynomial detrending) reduces to:
//!
//! ```text
//! minimize Σ (y_i - x_i^T β)^2
//! ```
//!
//! Implementation choices:
//! - SVD solve, so rank-deficient designs (e.g. a Breusch-Godfrey auxiliary
//!   regression that carries two constant columns) still produce the
//!   minimum-norm solution instead of failing.
//! - `(X'X)^-1` is taken as a pseudo-inverse for the same reason.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;

/// Tolerance used when discarding tiny singular values.
const PINV_EPS: f64 = 1e-12;

/// Result of an unweighted least squares solve.
#[derive(Debug, Clone)]
pub struct LeastSquares {
    pub beta: DVector<f64>,
    pub resid: DVector<f64>,
    pub ssr: f64,
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y ~ X` and return coefficients, residuals and SSR.
pub fn least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<LeastSquares, AppError> {
    if x.nrows() != y.len() {
        return Err(AppError::usage(format!(
            "Design has {} rows but outcome has {} observations.",
            x.nrows(),
            y.len()
        )));
    }
    let beta = solve_least_squares(x, y)
        .ok_or_else(|| AppError::numerical("Least squares system could not be solved."))?;
    let resid = y - x * &beta;
    let ssr = resid.dot(&resid);
    if !ssr.is_finite() {
        return Err(AppError::numerical("Non-finite sum of squared residuals."));
    }
    Ok(LeastSquares { beta, resid, ssr })
}

/// `(X'X)^+`, the (pseudo-)inverse of the cross-product matrix.
pub fn xtx_pinv(x: &DMatrix<f64>) -> Result<DMatrix<f64>, AppError> {
    let xtx = x.transpose() * x;
    xtx.pseudo_inverse(PINV_EPS)
        .map_err(|e| AppError::numerical(format!("Pseudo-inverse failed: {e}")))
}

/// True when column `j` of `x` is constant and non-zero.
pub fn is_constant_column(x: &DMatrix<f64>, j: usize) -> bool {
    let col = x.column(j);
    let Some(&first) = col.iter().next() else {
        return false;
    };
    first != 0.0 && col.iter().all(|&v| v == first)
}

/// True when any column of `x` is an intercept.
pub fn has_constant(x: &DMatrix<f64>) -> bool {
    (0..x.ncols()).any(|j| is_constant_column(x, j))
}

/// Coefficient of determination.
///
/// Centered around the mean of `y` when the design carries an intercept,
/// uncentered otherwise.
pub fn r_squared(y: &DVector<f64>, ssr: f64, centered: bool) -> f64 {
    let tss = if centered {
        let mean = y.mean();
        y.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
    } else {
        y.dot(y)
    };
    if tss <= 0.0 { 0.0 } else { 1.0 - ssr / tss }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn rank_deficient_design_still_solves() {
        // Two identical intercept columns.
        let x = DMatrix::from_row_slice(4, 3, &[
            1.0, 1.0, 0.0, //
            1.0, 1.0, 1.0, //
            1.0, 1.0, 2.0, //
            1.0, 1.0, 3.0,
        ]);
        let y = DVector::from_row_slice(&[1.0, 3.0, 5.0, 7.0]);
        let fit = least_squares(&x, &y).unwrap();
        assert!(fit.ssr < 1e-12);
        assert!((fit.beta[0] + fit.beta[1] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn r_squared_perfect_fit_is_one() {
        let y = DVector::from_row_slice(&[1.0, 2.0, 4.0]);
        assert!((r_squared(&y, 0.0, true) - 1.0).abs() < 1e-12);
        assert!((r_squared(&y, 0.0, false) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn constant_column_detection() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.5, 1.0, 0.7, 1.0, 0.1]);
        assert!(is_constant_column(&x, 0));
        assert!(!is_constant_column(&x, 1));
        assert!(has_constant(&x));
    }
}
