//! Residual diagnostics that decide whether a fit needs robust standard errors.
//!
//! - Breusch-Godfrey LM test for serial correlation up to `lags`
//! - Breusch-Pagan LM test for heteroskedasticity (Koenker's studentized form)
//!
//! Both are auxiliary regressions whose LM statistic is `n · R²`.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{chi2_sf, is_constant_column, least_squares, r_squared};

/// Result of a single LM test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LmTest {
    pub statistic: f64,
    pub pvalue: f64,
    pub df: usize,
}

/// Diagnostics computed on a fit's residuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub breusch_godfrey: LmTest,
    pub breusch_pagan: LmTest,
}

impl Diagnostics {
    pub fn run(x: &DMatrix<f64>, resid: &DVector<f64>, bg_lags: usize) -> Result<Self, AppError> {
        Ok(Self {
            breusch_godfrey: breusch_godfrey(x, resid, bg_lags)?,
            breusch_pagan: breusch_pagan(x, resid)?,
        })
    }

    /// True when either test rejects at level `alpha`.
    pub fn rejects(&self, alpha: f64) -> bool {
        self.breusch_godfrey.pvalue < alpha || self.breusch_pagan.pvalue < alpha
    }
}

/// Breusch-Godfrey test.
///
/// Pre-sample lags of the residuals are set to zero so the auxiliary
/// regression keeps all `n` observations:
///
/// ```text
/// e_t ~ X_t + 1 + e_{t-1} + ... + e_{t-p}
/// ```
pub fn breusch_godfrey(x: &DMatrix<f64>, resid: &DVector<f64>, lags: usize) -> Result<LmTest, AppError> {
    let (n, k) = x.shape();
    if lags == 0 {
        return Err(AppError::usage("Breusch-Godfrey lag order must be at least 1."));
    }
    if n <= k + 1 + lags {
        return Err(AppError::usage(format!(
            "Breusch-Godfrey with {lags} lags needs more than {} observations, got {n}.",
            k + 1 + lags
        )));
    }

    let aux = DMatrix::from_fn(n, k + 1 + lags, |t, j| {
        if j < k {
            x[(t, j)]
        } else if j == k {
            1.0
        } else {
            let lag = j - k;
            if t >= lag { resid[t - lag] } else { 0.0 }
        }
    });

    let fit = least_squares(&aux, resid)?;
    let lm = (n as f64 * r_squared(resid, fit.ssr, true)).max(0.0);
    Ok(LmTest {
        statistic: lm,
        pvalue: chi2_sf(lm, lags as f64)?,
        df: lags,
    })
}

/// Breusch-Pagan test against the non-constant columns of `x`.
///
/// Squared residuals are scaled by their mean and regressed on an
/// intercept plus the regressors; `df` is the number of non-constant
/// regressors.
pub fn breusch_pagan(x: &DMatrix<f64>, resid: &DVector<f64>) -> Result<LmTest, AppError> {
    let n = x.nrows();
    let regressors: Vec<usize> = (0..x.ncols()).filter(|&j| !is_constant_column(x, j)).collect();
    if regressors.is_empty() {
        return Err(AppError::usage(
            "Breusch-Pagan needs at least one non-constant regressor.",
        ));
    }
    if n <= regressors.len() + 1 {
        return Err(AppError::usage(format!(
            "Breusch-Pagan needs more than {} observations, got {n}.",
            regressors.len() + 1
        )));
    }

    let sq = resid.map(|e| e * e);
    let mean = sq.mean();
    if mean <= 0.0 {
        // A perfect fit has nothing to be heteroskedastic about.
        return Ok(LmTest {
            statistic: 0.0,
            pvalue: 1.0,
            df: regressors.len(),
        });
    }
    let u = sq / mean;

    let aux = DMatrix::from_fn(n, regressors.len() + 1, |t, j| {
        if j == 0 { 1.0 } else { x[(t, regressors[j - 1])] }
    });

    let fit = least_squares(&aux, &u)?;
    let lm = (n as f64 * r_squared(&u, fit.ssr, true)).max(0.0);
    let df = regressors.len();
    Ok(LmTest {
        statistic: lm,
        pvalue: chi2_sf(lm, df as f64)?,
        df,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    fn design(n: usize, rng: &mut StdRng) -> DMatrix<f64> {
        let normal = Normal::new(0.0, 1.0).unwrap();
        DMatrix::from_fn(n, 2, |_, j| if j == 0 { 1.0 } else { normal.sample(&mut *rng) })
    }

    #[test]
    fn bg_detects_ar1_residuals() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let n = 200;
        let x = design(n, &mut rng);
        let mut e = DVector::zeros(n);
        for t in 1..n {
            e[t] = 0.9 * e[t - 1] + normal.sample(&mut rng);
        }

        let bg = breusch_godfrey(&x, &e, 4).unwrap();
        assert_eq!(bg.df, 4);
        assert!(bg.pvalue < 0.001, "AR(1) residuals should reject, p={}", bg.pvalue);
    }

    #[test]
    fn bp_detects_variance_growing_with_regressor() {
        let mut rng = StdRng::seed_from_u64(11);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let n = 300;
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { 1.0 + i as f64 / 10.0 });
        let e = DVector::from_fn(n, |i, _| x[(i, 1)] * normal.sample(&mut rng));

        let bp = breusch_pagan(&x, &e).unwrap();
        assert_eq!(bp.df, 1);
        assert!(bp.pvalue < 0.001, "variance grows with x, p={}", bp.pvalue);
    }

    #[test]
    fn lm_statistics_are_valid_probabilities() {
        let mut rng = StdRng::seed_from_u64(3);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let x = design(120, &mut rng);
        let e = DVector::from_fn(120, |_, _| normal.sample(&mut rng));

        let d = Diagnostics::run(&x, &e, 4).unwrap();
        for test in [d.breusch_godfrey, d.breusch_pagan] {
            assert!(test.statistic >= 0.0);
            assert!((0.0..=1.0).contains(&test.pvalue));
        }
        assert!(!d.rejects(0.0));
        assert!(d.rejects(1.0 + f64::EPSILON));
    }

    #[test]
    fn too_few_observations() {
        let x = DMatrix::from_element(5, 2, 1.0);
        let e = DVector::zeros(5);
        assert!(matches!(breusch_godfrey(&x, &e, 4), Err(AppError::Usage(_))));
    }
}
