//! Study configuration (YAML).
//!
//! Every field has a default mirroring the NKPC study, so an empty file (or
//! `StudyConfig::default()`) reproduces it. Only `sources` normally needs to
//! be filled in.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::series::{FeatureDef, SeriesDef};
use crate::data::JoinKind;
use crate::error::AppError;
use crate::fit::FitOptions;
use crate::io::DEFAULT_ZIP_MEMBER;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    /// Source name -> file path. Relative paths resolve against the config file.
    pub sources: BTreeMap<String, PathBuf>,
    /// CSV member extracted from ZIP sources.
    pub zip_member: String,
    #[serde(flatten)]
    pub schema: DataSchema,
    pub join: JoinKind,
    /// Latest quarter kept after merging (inclusive).
    pub end_date: NaiveDate,
    /// Variable detrended with a linear trend after merging.
    pub detrend: Option<String>,
    /// Variable converted to a quarter-on-quarter growth rate (percent).
    pub growth_rate: Option<String>,
    pub expectations: Option<ExpectationsConfig>,
    pub estimation: EstimationConfig,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            sources: BTreeMap::new(),
            zip_member: DEFAULT_ZIP_MEMBER.to_string(),
            schema: DataSchema::default(),
            join: JoinKind::default(),
            end_date: ymd(2022, 10, 1),
            detrend: Some("GDP".into()),
            growth_rate: Some("CPI".into()),
            expectations: Some(ExpectationsConfig::default()),
            estimation: EstimationConfig::default(),
        }
    }
}

impl StudyConfig {
    /// Load a study file and resolve relative source paths against its directory.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.is_file() {
            return Err(AppError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AppError::io(format!("Failed to read config '{}'", path.display()), e))?;
        let mut cfg = Self::from_yaml(&raw)?;

        if let Some(base) = path.parent() {
            for source in cfg.sources.values_mut() {
                if source.is_relative() {
                    *source = base.join(&*source);
                }
            }
        }
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, AppError> {
        // An empty document means "all defaults".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(raw)
            .map_err(|e| AppError::Config(format!("Invalid study config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(exp) = &self.expectations {
            if exp.window == 0 {
                return Err(AppError::Config("expectations.window must be >= 1.".into()));
            }
        }
        self.estimation.validate()
    }
}

/// Which columns survive cleaning and how they are renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSchema {
    /// Value columns; each is renamed to its source key during cleaning.
    pub variables_to_keep: Vec<String>,
    /// Date columns combined into the `TIME` key.
    pub dates_to_keep: Vec<String>,
    /// Renames applied to the merged panel after the transforms.
    pub column_rename_mapping: BTreeMap<String, String>,
    /// Sources whose value column is replaced by its natural log.
    pub log_transform: Vec<String>,
}

impl Default for DataSchema {
    fn default() -> Self {
        Self {
            variables_to_keep: ["Value", "GDP", "PRS85006173", "NAIRU", "PX_MD"]
                .map(String::from)
                .to_vec(),
            dates_to_keep: ["DATE", "date", "TIME", "Quarter", "Year"]
                .map(String::from)
                .to_vec(),
            column_rename_mapping: BTreeMap::from([
                ("CPI_growth_rate".to_string(), "Inflation".to_string()),
                ("Emp".to_string(), "Unemployment".to_string()),
            ]),
            log_transform: vec!["GDP".into(), "Labor_share".into()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectationsConfig {
    pub variable: String,
    /// Trailing window in quarters.
    pub window: usize,
}

impl Default for ExpectationsConfig {
    fn default() -> Self {
        Self {
            variable: "Inflation".into(),
            window: 4,
        }
    }
}

/// The estimation grid: what to regress on what, and where to look for breaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    pub outcome: SeriesDef,
    pub features_1: Vec<FeatureDef>,
    pub features_2: Vec<FeatureDef>,
    pub methods: Vec<String>,
    /// Candidate structural breaks tested with the Chow test.
    pub breakpoints: Vec<NaiveDate>,
    /// Start dates of the sub-sample re-estimations.
    pub anchors: Vec<NaiveDate>,
    pub fit: FitOptions,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            outcome: SeriesDef::Column("Inflation".into()),
            features_1: vec![
                FeatureDef::column("Unemp", "Unemployment"),
                FeatureDef::difference("Unemp_Gap", "Unemployment", "NAIRU"),
                FeatureDef::column("Labor_share", "Labor_share"),
            ],
            features_2: vec![
                FeatureDef::column("BackExp", "Backward_Expectations_Inflation"),
                FeatureDef::column("MSC", "MSC"),
            ],
            methods: vec!["OLS".into()],
            breakpoints: vec![
                ymd(1984, 10, 1),
                ymd(2007, 7, 1),
                ymd(2013, 1, 1),
                ymd(2020, 4, 1),
            ],
            anchors: vec![
                ymd(1961, 4, 1),
                ymd(1984, 10, 1),
                ymd(2007, 7, 1),
                ymd(2013, 1, 1),
                ymd(2020, 4, 1),
            ],
            fit: FitOptions::default(),
        }
    }
}

impl EstimationConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.features_1.is_empty() || self.features_2.is_empty() {
            return Err(AppError::Config(
                "estimation.features_1 and estimation.features_2 must not be empty.".into(),
            ));
        }
        if self.methods.is_empty() {
            return Err(AppError::Config("estimation.methods must not be empty.".into()));
        }
        if !(0.0..1.0).contains(&self.fit.alpha) {
            return Err(AppError::Config(format!(
                "estimation.fit.alpha must be in [0, 1), got {}.",
                self.fit.alpha
            )));
        }
        for defs in [&self.features_1, &self.features_2] {
            let mut seen = std::collections::HashSet::new();
            for def in defs {
                if def.name.is_empty() || def.name.contains(['/', '\\', ',']) {
                    return Err(AppError::Config(format!("Invalid feature name `{}`.", def.name)));
                }
                if !seen.insert(def.name.as_str()) {
                    return Err(AppError::Config(format!("Duplicate feature name `{}`.", def.name)));
                }
            }
        }
        Ok(())
    }
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    // Only called with literal calendar dates.
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}
