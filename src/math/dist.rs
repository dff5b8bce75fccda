//! Tail probabilities and quantiles for the test statistics we report.
//!
//! Thin wrappers around `statrs` so callers get `AppError` instead of
//! distribution-specific error types.

use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal, StudentsT};

use crate::error::AppError;

/// Upper tail `P(X > stat)` for `X ~ χ²(df)`.
pub fn chi2_sf(stat: f64, df: f64) -> Result<f64, AppError> {
    let dist = ChiSquared::new(df)
        .map_err(|e| AppError::numerical(format!("χ² distribution (df={df}): {e}")))?;
    Ok(dist.sf(stat.max(0.0)))
}

/// Upper tail `P(X > stat)` for `X ~ F(d1, d2)`.
pub fn f_sf(stat: f64, d1: f64, d2: f64) -> Result<f64, AppError> {
    let dist = FisherSnedecor::new(d1, d2)
        .map_err(|e| AppError::numerical(format!("F distribution ({d1}, {d2}): {e}")))?;
    Ok(dist.sf(stat.max(0.0)))
}

/// Two-sided p-value of a t statistic; `df = None` uses the normal.
pub fn two_sided_pvalue(t: f64, df: Option<f64>) -> Result<f64, AppError> {
    if !t.is_finite() {
        return Ok(f64::NAN);
    }
    let tail = match df {
        Some(df) => student_t(df)?.sf(t.abs()),
        None => standard_normal()?.sf(t.abs()),
    };
    Ok((2.0 * tail).min(1.0))
}

/// Critical value `q` with `P(|T| > q) = alpha`; `df = None` uses the normal.
pub fn two_sided_critical(alpha: f64, df: Option<f64>) -> Result<f64, AppError> {
    let p = 1.0 - alpha / 2.0;
    Ok(match df {
        Some(df) => student_t(df)?.inverse_cdf(p),
        None => standard_normal()?.inverse_cdf(p),
    })
}

fn student_t(df: f64) -> Result<StudentsT, AppError> {
    StudentsT::new(0.0, 1.0, df)
        .map_err(|e| AppError::numerical(format!("Student-t distribution (df={df}): {e}")))
}

fn standard_normal() -> Result<Normal, AppError> {
    Normal::new(0.0, 1.0).map_err(|e| AppError::numerical(format!("Normal distribution: {e}")))
}
