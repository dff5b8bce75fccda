//! The estimation grid.
//!
//! `build_grid` expands an `EstimationConfig` into explicit units, one per
//! output artifact, and rejects grids where two units would write the same
//! file.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::study::EstimationConfig;
use crate::error::AppError;
use crate::fit::Method;

/// One `(feature_1, feature_2, method, breakpoint)` estimation.
///
/// `breakpoint` is the sub-sample start for sensitivity fits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EstimationUnit {
    pub feature_1: String,
    pub feature_2: String,
    pub method: Method,
    pub breakpoint: Option<NaiveDate>,
}

impl EstimationUnit {
    pub fn artifact_stem(&self) -> String {
        match self.breakpoint {
            None => format!("{}_{}_{}", self.feature_1, self.feature_2, self.method),
            Some(date) => format!(
                "{}_{}_{}_sensitivity_{date}",
                self.feature_1, self.feature_2, self.method
            ),
        }
    }

    /// Stem of the figure for this unit (sub-sample fits share the full-sample figure).
    pub fn figure_stem(&self) -> String {
        format!("{}_{}_{}", self.feature_1, self.feature_2, self.method)
    }
}

impl fmt::Display for EstimationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.artifact_stem())
    }
}

/// One breakpoint-dummy refit of the outcome on a single feature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BreakUnit {
    pub feature: String,
    pub method: Method,
}

impl BreakUnit {
    pub fn artifact_stem(&self) -> String {
        format!("{}_{}_breakdummy", self.feature, self.method)
    }
}

/// Every unit of a study, validated for artifact uniqueness.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StudyGrid {
    /// Full-sample fits.
    pub estimations: Vec<EstimationUnit>,
    /// Sub-sample fits, one per anchor date.
    pub sensitivity: Vec<EstimationUnit>,
    /// Breakpoint-dummy refits.
    pub breaks: Vec<BreakUnit>,
}

impl StudyGrid {
    pub fn len(&self) -> usize {
        self.estimations.len() + self.sensitivity.len() + self.breaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn methods(&self) -> Vec<Method> {
        let mut out: Vec<Method> = Vec::new();
        for unit in &self.estimations {
            if !out.contains(&unit.method) {
                out.push(unit.method);
            }
        }
        out
    }

    fn validate(&self) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        let stems = self
            .estimations
            .iter()
            .chain(&self.sensitivity)
            .map(EstimationUnit::artifact_stem)
            .chain(self.breaks.iter().map(BreakUnit::artifact_stem));
        for stem in stems {
            if !seen.insert(stem.clone()) {
                return Err(AppError::Config(format!(
                    "Two estimation units write the same artifact `{stem}`."
                )));
            }
        }
        Ok(())
    }
}

/// Expand the configuration into the Cartesian grid of units.
pub fn build_grid(cfg: &EstimationConfig) -> Result<StudyGrid, AppError> {
    cfg.validate()?;
    let methods: Vec<Method> = cfg
        .methods
        .iter()
        .map(|m| m.parse())
        .collect::<Result<_, _>>()?;

    let mut grid = StudyGrid::default();
    for &method in &methods {
        for f1 in &cfg.features_1 {
            for f2 in &cfg.features_2 {
                let unit = EstimationUnit {
                    feature_1: f1.name.clone(),
                    feature_2: f2.name.clone(),
                    method,
                    breakpoint: None,
                };
                for &anchor in &cfg.anchors {
                    grid.sensitivity.push(EstimationUnit {
                        breakpoint: Some(anchor),
                        ..unit.clone()
                    });
                }
                grid.estimations.push(unit);
            }
        }
        if !cfg.breakpoints.is_empty() {
            for def in cfg.features_1.iter().chain(&cfg.features_2) {
                grid.breaks.push(BreakUnit {
                    feature: def.name.clone(),
                    method,
                });
            }
        }
    }

    grid.validate()?;
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::series::FeatureDef;

    #[test]
    fn default_grid_matches_the_study() {
        let grid = build_grid(&EstimationConfig::default()).unwrap();
        assert_eq!(grid.estimations.len(), 6);
        assert_eq!(grid.sensitivity.len(), 30);
        assert_eq!(grid.breaks.len(), 5);
        assert_eq!(grid.estimations[0].artifact_stem(), "Unemp_BackExp_OLS");
        assert_eq!(
            grid.sensitivity[0].artifact_stem(),
            "Unemp_BackExp_OLS_sensitivity_1961-04-01"
        );
        assert_eq!(grid.breaks[0].artifact_stem(), "Unemp_OLS_breakdummy");
    }

    #[test]
    fn colliding_stems_are_rejected() {
        // `A_B` + `C` and `A` + `B_C` both map to `A_B_C_OLS`.
        let cfg = EstimationConfig {
            features_1: vec![FeatureDef::column("A_B", "x"), FeatureDef::column("A", "x")],
            features_2: vec![FeatureDef::column("C", "y"), FeatureDef::column("B_C", "y")],
            anchors: vec![],
            breakpoints: vec![],
            ..EstimationConfig::default()
        };
        assert!(matches!(build_grid(&cfg), Err(AppError::Config(_))));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let cfg = EstimationConfig {
            methods: vec!["GMM".into()],
            ..EstimationConfig::default()
        };
        assert!(matches!(build_grid(&cfg), Err(AppError::UnsupportedMethod(_))));
    }
}
