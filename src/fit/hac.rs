//! Newey-West HAC covariance for OLS coefficients.
//!
//! ```text
//! S   = Σ_t u_t u_t' + Σ_{l=1}^{L} w_l (Γ_l + Γ_l')
//! Γ_l = Σ_{t=l}^{n-1} u_t u_{t-l}'          with u_t = x_t e_t
//! w_l = 1 - l/(L+1)                         (Bartlett kernel)
//! V   = (X'X)^-1 S (X'X)^-1 · n/(n-k)
//! ```
//!
//! The `n/(n-k)` factor is the usual small-sample correction.

use nalgebra::{DMatrix, DVector};

/// Bartlett kernel weight for `lag` with bandwidth `max_lag`.
pub fn bartlett_weight(lag: usize, max_lag: usize) -> f64 {
    if lag == 0 {
        1.0
    } else if lag <= max_lag {
        1.0 - lag as f64 / (max_lag as f64 + 1.0)
    } else {
        0.0
    }
}

/// HAC covariance of the OLS coefficients.
///
/// `xtx_inv` is `(X'X)^-1` for the same design.
pub fn newey_west(
    x: &DMatrix<f64>,
    resid: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
    max_lag: usize,
) -> DMatrix<f64> {
    let (n, k) = x.shape();

    // Score contributions u_t = x_t * e_t, one row per observation.
    let mut u = x.clone();
    for (mut row, &e) in u.row_iter_mut().zip(resid.iter()) {
        row *= e;
    }

    let mut s = u.transpose() * &u;
    for lag in 1..=max_lag.min(n.saturating_sub(1)) {
        let w = bartlett_weight(lag, max_lag);
        let lead = u.rows(lag, n - lag);
        let lagged = u.rows(0, n - lag);
        let gamma = lead.transpose() * lagged;
        s += (&gamma + gamma.transpose()) * w;
    }

    let correction = if n > k { n as f64 / (n - k) as f64 } else { 1.0 };
    xtx_inv * s * xtx_inv * correction
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::xtx_pinv;
    use approx::assert_relative_eq;

    #[test]
    fn bartlett_weights_decay_linearly() {
        assert_eq!(bartlett_weight(0, 4), 1.0);
        assert_relative_eq!(bartlett_weight(1, 4), 0.8);
        assert_relative_eq!(bartlett_weight(4, 4), 0.2);
        assert_eq!(bartlett_weight(5, 4), 0.0);
    }

    #[test]
    fn zero_lags_is_corrected_white_estimator() {
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 2.0, 3.0, 4.0]);
        let e = DVector::from_row_slice(&[0.5, -0.5, 1.0, -1.0]);
        let inv = xtx_pinv(&x).unwrap();
        let v = newey_west(&x, &e, &inv, 0);

        // Σ x²e² = 0.25 + 1 + 9 + 16 = 26.25, X'X = 30, n/(n-k) = 4/3.
        let expected = 26.25 / (30.0 * 30.0) * (4.0 / 3.0);
        assert_relative_eq!(v[(0, 0)], expected, epsilon = 1e-12);
    }

    #[test]
    fn covariance_is_symmetric() {
        let x = DMatrix::from_fn(30, 2, |i, j| if j == 0 { 1.0 } else { (i as f64).sin() });
        let e = DVector::from_fn(30, |i, _| ((i * 7) % 5) as f64 - 2.0);
        let inv = xtx_pinv(&x).unwrap();
        let v = newey_west(&x, &e, &inv, 4);
        assert_relative_eq!(v[(0, 1)], v[(1, 0)], epsilon = 1e-12);
    }
}
