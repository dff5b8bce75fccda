//! Fitted regression results.
//!
//! `FittedModel` is plain data (serde-friendly) plus a handful of inference
//! helpers. It is created by the fitter, persisted by `io::model_file`, and
//! read back by reporting and sensitivity code.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fit::diagnostics::Diagnostics;
use crate::math::{two_sided_critical, two_sided_pvalue};

/// Supported estimation methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Method {
    #[serde(rename = "OLS")]
    Ols,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Ols => "OLS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OLS" => Ok(Method::Ols),
            other => Err(AppError::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Covariance estimator behind the reported standard errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CovType {
    /// `σ² (X'X)^-1`
    NonRobust,
    /// Newey-West with Bartlett weights.
    Hac { maxlags: usize },
}

impl CovType {
    pub fn label(self) -> String {
        match self {
            CovType::NonRobust => "nonrobust".to_string(),
            CovType::Hac { maxlags } => format!("HAC (maxlags={maxlags})"),
        }
    }

    pub fn is_robust(self) -> bool {
        matches!(self, CovType::Hac { .. })
    }
}

/// A fitted linear regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub method: Method,
    pub outcome: String,
    /// Regressor names in coefficient order (including `const` if one was added).
    pub exog_names: Vec<String>,
    pub params: Vec<f64>,
    pub bse: Vec<f64>,
    pub cov_params: Vec<Vec<f64>>,
    pub cov_type: CovType,
    pub resid: Vec<f64>,
    pub fitted: Vec<f64>,
    pub nobs: usize,
    pub df_resid: f64,
    pub ssr: f64,
    pub rsquared: f64,
    pub rsquared_adj: f64,
    /// Preprocessing applied to the user features before fitting.
    pub preprocessing: Preprocessing,
    pub diagnostics: Diagnostics,
}

/// How user-supplied feature values map onto design columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Preprocessing {
    /// A `const` column was prepended.
    pub added_constant: bool,
    /// Means subtracted from each user feature (empty when not centered).
    pub feature_means: Vec<f64>,
}

impl FittedModel {
    pub fn n_params(&self) -> usize {
        self.params.len()
    }

    pub fn tvalues(&self) -> Vec<f64> {
        self.params
            .iter()
            .zip(&self.bse)
            .map(|(b, se)| if *se > 0.0 { b / se } else { f64::NAN })
            .collect()
    }

    /// Degrees of freedom for inference; HAC fits use the normal.
    fn inference_df(&self) -> Option<f64> {
        if self.cov_type.is_robust() { None } else { Some(self.df_resid) }
    }

    pub fn pvalues(&self) -> Result<Vec<f64>, AppError> {
        let df = self.inference_df();
        self.tvalues()
            .into_iter()
            .map(|t| two_sided_pvalue(t, df))
            .collect()
    }

    /// `(lower, upper)` confidence bounds at level `1 - alpha`.
    pub fn conf_int(&self, alpha: f64) -> Result<Vec<(f64, f64)>, AppError> {
        let q = two_sided_critical(alpha, self.inference_df())?;
        Ok(self
            .params
            .iter()
            .zip(&self.bse)
            .map(|(b, se)| (b - q * se, b + q * se))
            .collect())
    }

    /// Predict the outcome for one row of user feature values.
    ///
    /// `features` excludes the automatically added constant and is given in
    /// the original (uncentered) units.
    pub fn predict(&self, features: &[f64]) -> Result<f64, AppError> {
        let offset = usize::from(self.preprocessing.added_constant);
        if features.len() + offset != self.n_params() {
            return Err(AppError::usage(format!(
                "Model has {} feature(s), got {} value(s).",
                self.n_params() - offset,
                features.len()
            )));
        }
        let mut y = if self.preprocessing.added_constant { self.params[0] } else { 0.0 };
        for (j, &v) in features.iter().enumerate() {
            let mean = self.preprocessing.feature_means.get(j).copied().unwrap_or(0.0);
            y += self.params[j + offset] * (v - mean);
        }
        Ok(y)
    }

    pub fn summary(&self) -> Result<String, AppError> {
        crate::report::format_summary(self)
    }

    pub fn to_latex(&self, caption: Option<&str>) -> Result<String, AppError> {
        crate::report::to_latex(self, caption)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        crate::io::model_file::save_model(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        crate::io::model_file::load_model(path)
    }
}
