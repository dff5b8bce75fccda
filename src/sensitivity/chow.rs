//! Chow test for a structural break at a known index.
//!
//! The outcome is regressed on an intercept and the feature (`k = 2`) over
//! the pooled sample and over each segment:
//!
//! ```text
//! before = [0, break_index]      after = [break_index + 1, n)
//!
//!       (RSS_p - RSS_1 - RSS_2) / k
//! F = -------------------------------  ~  F(k, n - 2k)
//!       (RSS_1 + RSS_2) / (n - 2k)
//! ```

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::{f_sf, least_squares};

/// Regressors per segment: intercept + feature.
const K: usize = 2;

/// Outcome of one Chow test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChowTest {
    pub statistic: f64,
    pub pvalue: f64,
    /// `pvalue < alpha`
    pub significant: bool,
    pub n_before: usize,
    pub n_after: usize,
}

/// Run the Chow test splitting after `break_index`.
///
/// The regression is `outcome ~ 1 + feature`: the outcome is the dependent
/// variable and the feature the regressor. Swapping the two arguments tests a
/// different relation and generally gives a different p-value.
pub fn chow_test(
    outcome: &[f64],
    feature: &[f64],
    break_index: usize,
    alpha: f64,
) -> Result<ChowTest, AppError> {
    let n = outcome.len();
    if feature.len() != n {
        return Err(AppError::usage(format!(
            "Chow test: outcome has {n} observations, feature has {}.",
            feature.len()
        )));
    }
    if outcome.iter().chain(feature).any(|v| !v.is_finite()) {
        return Err(AppError::usage("Chow test: series contain missing or non-finite values."));
    }
    let n_before = break_index + 1;
    let n_after = n.saturating_sub(n_before);
    if n_before <= K || n_after <= K {
        return Err(AppError::usage(format!(
            "Chow test: each segment needs more than {K} observations (got {n_before} before, {n_after} after)."
        )));
    }

    let rss_pooled = segment_rss(outcome, feature)?;
    let rss_before = segment_rss(&outcome[..n_before], &feature[..n_before])?;
    let rss_after = segment_rss(&outcome[n_before..], &feature[n_before..])?;

    let df_denom = (n - 2 * K) as f64;
    let numer = ((rss_pooled - rss_before - rss_after) / K as f64).max(0.0);
    let denom = (rss_before + rss_after) / df_denom;

    let (statistic, pvalue) = if denom > 0.0 {
        let f = numer / denom;
        (f, f_sf(f, K as f64, df_denom)?)
    } else if numer > 0.0 {
        // Both segments fit exactly but the pooled line does not.
        (f64::INFINITY, 0.0)
    } else {
        (0.0, 1.0)
    };

    Ok(ChowTest {
        statistic,
        pvalue,
        significant: pvalue < alpha,
        n_before,
        n_after,
    })
}

fn segment_rss(y: &[f64], x: &[f64]) -> Result<f64, AppError> {
    let design = DMatrix::from_fn(y.len(), K, |i, j| if j == 0 { 1.0 } else { x[i] });
    let fit = least_squares(&design, &DVector::from_column_slice(y))?;
    Ok(fit.ssr)
}
