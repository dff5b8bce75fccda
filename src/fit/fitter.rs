//! OLS fitting with diagnostic-driven covariance selection.
//!
//! For each specification we:
//! 1. build the design from the feature series (optionally centered, with an
//!    optional explicit constant; no intercept is ever added silently)
//! 2. solve OLS
//! 3. run Breusch-Godfrey and Breusch-Pagan on the residuals
//! 4. if either rejects at `alpha`, swap the covariance for Newey-West HAC
//!
//! Step 4 only changes the covariance; the point estimates are the OLS ones.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{NamedSeries, Series};
use crate::error::AppError;
use crate::fit::diagnostics::Diagnostics;
use crate::fit::hac::newey_west;
use crate::fit::model::{CovType, FittedModel, Method, Preprocessing};
use crate::math::{has_constant, least_squares, r_squared, xtx_pinv};

/// Options that shape a fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Subtract each feature's sample mean before fitting.
    pub center: bool,
    /// Prepend an explicit `const` regressor.
    pub add_constant: bool,
    /// Breusch-Godfrey lag order.
    pub bg_lags: usize,
    /// Newey-West bandwidth for the HAC refit.
    pub hac_maxlags: usize,
    /// Significance level for the diagnostics.
    pub alpha: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            center: false,
            add_constant: false,
            bg_lags: 4,
            hac_maxlags: 4,
            alpha: 0.05,
        }
    }
}

/// Fit `outcome` on `features` with the named method.
///
/// Fails with `UnsupportedMethod` for anything but `"OLS"`.
pub fn fit(
    outcome: &Series,
    features: &[Series],
    method: &str,
    opts: &FitOptions,
) -> Result<FittedModel, AppError> {
    let method: Method = method.parse()?;
    fit_with(outcome, features, method, opts)
}

/// Fit with an already-parsed method.
pub fn fit_with(
    outcome: &Series,
    features: &[Series],
    method: Method,
    opts: &FitOptions,
) -> Result<FittedModel, AppError> {
    match method {
        Method::Ols => fit_ols(outcome, features, opts),
    }
}

/// Fit every `(first, second)` pair.
///
/// Keys are `"{name1}, {name2}"`.
pub fn fit_batch(
    outcome: &Series,
    first: &NamedSeries,
    second: &NamedSeries,
    method: &str,
    opts: &FitOptions,
) -> Result<BTreeMap<String, FittedModel>, AppError> {
    let method: Method = method.parse()?;
    let mut out = BTreeMap::new();
    for f1 in first.iter() {
        for f2 in second.iter() {
            let model = fit_with(outcome, &[f1.clone(), f2.clone()], method, opts)?;
            out.insert(batch_key(&f1.name, &f2.name), model);
        }
    }
    Ok(out)
}

/// Key used by `fit_batch`.
pub fn batch_key(name1: &str, name2: &str) -> String {
    format!("{name1}, {name2}")
}

fn fit_ols(outcome: &Series, features: &[Series], opts: &FitOptions) -> Result<FittedModel, AppError> {
    validate_inputs(outcome, features)?;

    let n = outcome.len();
    let feature_means: Vec<f64> = if opts.center {
        features.iter().map(Series::mean).collect()
    } else {
        Vec::new()
    };

    let offset = usize::from(opts.add_constant);
    let k = features.len() + offset;
    let x = DMatrix::from_fn(n, k, |i, j| {
        if j < offset {
            return 1.0;
        }
        let f = j - offset;
        let mean = feature_means.get(f).copied().unwrap_or(0.0);
        features[f].values[i] - mean
    });
    let y = DVector::from_column_slice(&outcome.values);

    if n <= k {
        return Err(AppError::usage(format!(
            "Need more observations ({n}) than regressors ({k})."
        )));
    }

    let ols = least_squares(&x, &y)?;
    let xtx_inv = xtx_pinv(&x)?;
    let df_resid = (n - k) as f64;
    let scale = ols.ssr / df_resid;

    let diagnostics = Diagnostics::run(&x, &ols.resid, opts.bg_lags)?;
    let bg_p = diagnostics.breusch_godfrey.pvalue;
    let bp_p = diagnostics.breusch_pagan.pvalue;

    let (cov, cov_type) = if diagnostics.rejects(opts.alpha) {
        info!(
            outcome = %outcome.name,
            "Refitted model with HAC standard errors (BG p-value={bg_p:.4}, BP p-value={bp_p:.4})."
        );
        (
            newey_west(&x, &ols.resid, &xtx_inv, opts.hac_maxlags),
            CovType::Hac {
                maxlags: opts.hac_maxlags,
            },
        )
    } else {
        info!(
            outcome = %outcome.name,
            "Fitted model with OLS (BG p-value={bg_p:.4}, BP p-value={bp_p:.4})."
        );
        (&xtx_inv * scale, CovType::NonRobust)
    };

    let bse: Vec<f64> = (0..k).map(|j| cov[(j, j)].max(0.0).sqrt()).collect();
    if bse.iter().any(|v| !v.is_finite()) {
        return Err(AppError::numerical("Non-finite standard errors."));
    }

    let centered = has_constant(&x);
    let rsquared = r_squared(&y, ols.ssr, centered);
    let df_model = if centered { (k - 1) as f64 } else { k as f64 };
    let rsquared_adj = 1.0 - (1.0 - rsquared) * (df_resid + df_model) / df_resid;

    let mut exog_names = Vec::with_capacity(k);
    if opts.add_constant {
        exog_names.push("const".to_string());
    }
    exog_names.extend(features.iter().map(|s| s.name.clone()));

    let fitted = &x * &ols.beta;

    Ok(FittedModel {
        method: Method::Ols,
        outcome: outcome.name.clone(),
        exog_names,
        params: ols.beta.iter().copied().collect(),
        bse,
        cov_params: (0..k).map(|i| (0..k).map(|j| cov[(i, j)]).collect()).collect(),
        cov_type,
        resid: ols.resid.iter().copied().collect(),
        fitted: fitted.iter().copied().collect(),
        nobs: n,
        df_resid,
        ssr: ols.ssr,
        rsquared,
        rsquared_adj,
        preprocessing: Preprocessing {
            added_constant: opts.add_constant,
            feature_means,
        },
        diagnostics,
    })
}

fn validate_inputs(outcome: &Series, features: &[Series]) -> Result<(), AppError> {
    if features.is_empty() {
        return Err(AppError::usage("At least one feature series is required."));
    }
    let n = outcome.len();
    for f in features {
        if f.len() != n {
            return Err(AppError::usage(format!(
                "Feature `{}` has {} observations, outcome `{}` has {n}.",
                f.name,
                f.len(),
                outcome.name
            )));
        }
    }
    for s in std::iter::once(outcome).chain(features) {
        if s.values.iter().any(|v| !v.is_finite()) {
            return Err(AppError::usage(format!(
                "Series `{}` contains missing or non-finite values.",
                s.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::prelude::*;
    use rand::rngs::StdRng;
    use rand_distr::Normal;

    fn gaussian(n: usize, sd: f64, rng: &mut StdRng) -> Vec<f64> {
        let normal = Normal::new(0.0, sd).unwrap();
        (0..n).map(|_| normal.sample(&mut *rng)).collect()
    }

    fn three_feature_data(seed: u64) -> (Series, Vec<Series>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = 200;
        let f1 = gaussian(n, 1.0, &mut rng);
        let f2 = gaussian(n, 1.0, &mut rng);
        let f3 = gaussian(n, 1.0, &mut rng);
        let noise = gaussian(n, 0.1, &mut rng);
        let y = (0..n)
            .map(|i| 2.0 * f1[i] + 3.0 * f2[i] + 4.0 * f3[i] + noise[i])
            .collect();
        (
            Series::new("y", y),
            vec![Series::new("f1", f1), Series::new("f2", f2), Series::new("f3", f3)],
        )
    }

    #[test]
    fn non_ols_method_is_rejected() {
        let (y, x) = three_feature_data(1);
        for method in ["quadratic", "ols", "WLS", ""] {
            let err = fit(&y, &x, method, &FitOptions::default()).unwrap_err();
            assert!(matches!(err, AppError::UnsupportedMethod(_)), "{method}");
        }
    }

    #[test]
    fn recovers_known_coefficients_in_feature_order() {
        let (y, x) = three_feature_data(123);
        let model = fit(&y, &x, "OLS", &FitOptions::default()).unwrap();

        assert_eq!(model.params.len(), 3);
        assert_eq!(model.exog_names, vec!["f1", "f2", "f3"]);
        for (got, want) in model.params.iter().zip([2.0, 3.0, 4.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 0.1);
        }
    }

    #[test]
    fn refitting_is_deterministic() {
        let (y, x) = three_feature_data(5);
        let a = fit(&y, &x, "OLS", &FitOptions::default()).unwrap();
        let b = fit(&y, &x, "OLS", &FitOptions::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn well_behaved_errors_keep_the_plain_covariance() {
        let mut plain_fits = 0;
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(1_000 + seed);
            let n = 200;
            let x1 = gaussian(n, 1.0, &mut rng);
            let noise = gaussian(n, 0.5, &mut rng);
            let y = Series::new("y", (0..n).map(|i| -0.8 * x1[i] + noise[i]).collect());
            let features = vec![Series::new("x1", x1)];

            let model = fit(&y, &features, "OLS", &FitOptions::default()).unwrap();
            let bg = model.diagnostics.breusch_godfrey.pvalue;
            let bp = model.diagnostics.breusch_pagan.pvalue;
            if bg < 0.05 || bp < 0.05 {
                assert!(model.cov_type.is_robust(), "seed {seed}");
                continue;
            }
            plain_fits += 1;
            assert_eq!(model.cov_type, CovType::NonRobust, "seed {seed}");
            let s2 = model.ssr / model.df_resid;
            let xtx: f64 = features[0].values.iter().map(|v| v * v).sum();
            assert_abs_diff_eq!(model.bse[0], (s2 / xtx).sqrt(), epsilon = 1e-10);
        }
        // i.i.d. homoskedastic errors: both tests pass at 5% about 90% of the time.
        assert!(plain_fits >= 12, "only {plain_fits} of 20 fits kept nonrobust errors");
    }

    #[test]
    fn autocorrelated_errors_trigger_hac_without_moving_estimates() {
        let mut rng = StdRng::seed_from_u64(99);
        let n = 200;
        let x1 = gaussian(n, 1.0, &mut rng);
        let shocks = gaussian(n, 1.0, &mut rng);
        let mut e = vec![0.0; n];
        for t in 1..n {
            e[t] = 0.9 * e[t - 1] + shocks[t];
        }
        let y = Series::new("y", (0..n).map(|i| 1.5 * x1[i] + e[i]).collect());
        let features = vec![Series::new("x1", x1)];

        let robust = fit(&y, &features, "OLS", &FitOptions::default()).unwrap();
        assert!(robust.diagnostics.breusch_godfrey.pvalue < 0.05);
        assert_eq!(robust.cov_type, CovType::Hac { maxlags: 4 });

        // alpha = 0 never rejects: the plain OLS covariance.
        let plain_opts = FitOptions {
            alpha: 0.0,
            ..FitOptions::default()
        };
        let plain = fit(&y, &features, "OLS", &plain_opts).unwrap();
        assert_eq!(plain.cov_type, CovType::NonRobust);
        assert_eq!(plain.params, robust.params);
        assert!((plain.bse[0] - robust.bse[0]).abs() > 1e-6);

        let s2 = plain.ssr / plain.df_resid;
        let xtx: f64 = features[0].values.iter().map(|v| v * v).sum();
        assert_abs_diff_eq!(plain.bse[0], (s2 / xtx).sqrt(), epsilon = 1e-10);
    }

    #[test]
    fn constant_and_centering_are_explicit() {
        let n = 40;
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y = Series::new("y", x.iter().map(|v| 5.0 + 2.0 * v + (v * 1.3).sin() * 0.01).collect());
        let features = vec![Series::new("x", x)];

        let with_const = FitOptions {
            add_constant: true,
            ..FitOptions::default()
        };
        let model = fit(&y, &features, "OLS", &with_const).unwrap();
        assert_eq!(model.exog_names, vec!["const", "x"]);
        assert_abs_diff_eq!(model.params[0], 5.0, epsilon = 0.05);
        assert_abs_diff_eq!(model.params[1], 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(model.predict(&[10.0]).unwrap(), 25.0, epsilon = 0.05);

        let centered = FitOptions {
            add_constant: true,
            center: true,
            ..FitOptions::default()
        };
        let model_c = fit(&y, &features, "OLS", &centered).unwrap();
        assert_abs_diff_eq!(model_c.params[1], 2.0, epsilon = 1e-3);
        assert_abs_diff_eq!(model_c.predict(&[10.0]).unwrap(), 25.0, epsilon = 0.05);
    }

    #[test]
    fn batch_fits_every_pair() {
        let (y, x) = three_feature_data(8);
        let first: NamedSeries = x[..2].iter().cloned().collect();
        let second: NamedSeries = x[2..].iter().cloned().collect();

        let models = fit_batch(&y, &first, &second, "OLS", &FitOptions::default()).unwrap();
        let keys: Vec<&str> = models.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["f1, f3", "f2, f3"]);
        assert_eq!(models["f1, f3"].exog_names, vec!["f1", "f3"]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let y = Series::new("y", vec![1.0; 20]);
        let x = vec![Series::new("x", vec![1.0; 19])];
        assert!(matches!(fit(&y, &x, "OLS", &FitOptions::default()), Err(AppError::Usage(_))));
    }
}
