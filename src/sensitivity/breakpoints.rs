//! Structural-break sensitivity.
//!
//! Three views on parameter stability:
//!
//! - `breakpoint_pvalues`: Chow p-value for every (feature, candidate date)
//! - `refit_with_breakpoints`: refit with 0/1 dummies for significant breaks
//! - `subsample_fits`: re-run the batched fitter on samples starting at each anchor

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{FeatureDef, SeriesDef, named_series};
use crate::domain::{NamedSeries, Panel, Series};
use crate::error::AppError;
use crate::fit::{FitOptions, FittedModel, Method, fit_batch, fit_with};
use crate::sensitivity::chow::chow_test;

/// Significance level of the Chow tests.
pub const BREAK_ALPHA: f64 = 0.05;

/// Which significant breaks end up in the dummy refit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakPolicy {
    /// Only the last significant date gets a dummy.
    #[default]
    LastSignificant,
    /// Every significant date gets its own dummy.
    Cumulative,
}

/// Result of `refit_with_breakpoints`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointRefit {
    pub model: FittedModel,
    /// Dates whose dummies are in `model` (empty when no break was significant).
    pub break_dates: Vec<NaiveDate>,
    /// Chow p-value of every candidate date.
    pub pvalues: BTreeMap<NaiveDate, f64>,
}

/// Chow p-values keyed by feature name, then candidate date.
///
/// Each test regresses `outcome` on an intercept and the feature.
pub fn breakpoint_pvalues(
    panel: &Panel,
    outcome: &Series,
    features: &NamedSeries,
    dates: &[NaiveDate],
) -> Result<BTreeMap<String, BTreeMap<NaiveDate, f64>>, AppError> {
    let mut out = BTreeMap::new();
    for feature in features.iter() {
        out.insert(feature.name.clone(), chow_pvalues(panel, outcome, feature, dates)?);
    }
    Ok(out)
}

fn chow_pvalues(
    panel: &Panel,
    outcome: &Series,
    feature: &Series,
    dates: &[NaiveDate],
) -> Result<BTreeMap<NaiveDate, f64>, AppError> {
    for s in [outcome, feature] {
        if s.len() != panel.len() {
            return Err(AppError::usage(format!(
                "Series `{}` has {} observations, panel has {}.",
                s.name,
                s.len(),
                panel.len()
            )));
        }
    }
    let mut out = BTreeMap::new();
    for &date in dates {
        let idx = panel.position(date)?;
        let test = chow_test(&outcome.values, &feature.values, idx, BREAK_ALPHA)?;
        debug!(feature = %feature.name, %date, f = test.statistic, p = test.pvalue, "chow test");
        out.insert(date, test.pvalue);
    }
    Ok(out)
}

/// 1.0 for observations strictly after `date`, else 0.0.
pub fn break_dummy(panel: &Panel, date: NaiveDate) -> Series {
    Series::new(
        format!("break_{date}"),
        panel.index().iter().map(|d| if *d > date { 1.0 } else { 0.0 }).collect(),
    )
}

/// Refit `outcome ~ feature (+ dummies)` for the candidate breaks that pass
/// the Chow test, in date order.
pub fn refit_with_breakpoints(
    panel: &Panel,
    outcome: &Series,
    feature: &Series,
    dates: &[NaiveDate],
    method: &str,
    opts: &FitOptions,
    policy: BreakPolicy,
) -> Result<BreakpointRefit, AppError> {
    let method: Method = method.parse()?;
    let pvalues = chow_pvalues(panel, outcome, feature, dates)?;

    let significant: Vec<NaiveDate> = dates
        .iter()
        .copied()
        .filter(|d| pvalues.get(d).is_some_and(|p| *p < BREAK_ALPHA))
        .collect();
    let break_dates = match policy {
        BreakPolicy::LastSignificant => significant.last().copied().into_iter().collect(),
        BreakPolicy::Cumulative => significant,
    };

    let mut regressors = vec![feature.clone()];
    regressors.extend(break_dates.iter().map(|d| break_dummy(panel, *d)));
    let model = fit_with(outcome, &regressors, method, opts)?;

    info!(
        feature = %feature.name,
        breaks = ?break_dates,
        "refitted with breakpoint dummies"
    );
    Ok(BreakpointRefit {
        model,
        break_dates,
        pvalues,
    })
}

/// Batched fits on the sub-samples starting at each anchor (inclusive).
///
/// Series are re-derived on each truncated panel; keys of the inner maps are
/// the `fit_batch` keys.
pub fn subsample_fits(
    panel: &Panel,
    outcome: &SeriesDef,
    first: &[FeatureDef],
    second: &[FeatureDef],
    anchors: &[NaiveDate],
    method: &str,
    opts: &FitOptions,
) -> Result<BTreeMap<NaiveDate, BTreeMap<String, FittedModel>>, AppError> {
    let mut out = BTreeMap::new();
    for &anchor in anchors {
        let sub = panel.since(anchor);
        if sub.is_empty() {
            return Err(AppError::usage(format!("No observations on or after {anchor}.")));
        }
        let y = outcome.evaluate(&sub)?;
        let f1 = named_series(first, &sub)?;
        let f2 = named_series(second, &sub)?;
        debug!(%anchor, rows = sub.len(), "sub-sample");
        out.insert(anchor, fit_batch(&y, &f1, &f2, method, opts)?);
    }
    Ok(out)
}
