//! Study pipeline shared by the `clean`, `estimate`, `sensitivity` and `run`
//! commands.
//!
//! raw sources -> clean panel -> estimation grid -> sensitivity analysis
//!
//! Every stage writes its artifacts under one output root (see
//! `OutputLayout`), so stages can be rerun independently from the clean
//! panel on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{EstimationConfig, EstimationUnit, FeatureDef, StudyConfig, StudyGrid, named_series};
use crate::data::{TIME, backward_expectations, clean_data, detrend, growth_rate, merge};
use crate::domain::{Panel, Series};
use crate::error::AppError;
use crate::fit::{FittedModel, Method, batch_key, fit_with};
use crate::io::{
    ArchiveOptions, INDEX_COLUMN, load_sources, read_panel_csv, write_json, write_panel_csv, write_text,
};
use crate::plot::{RegressionFigure, write_regression_svg};
use crate::sensitivity::{
    BreakPolicy, BreakpointRefit, breakpoint_pvalues, refit_with_breakpoints, subsample_fits,
};

/// SVG size of the regression figures.
pub const FIGURE_SIZE: (u32, u32) = (800, 600);

/// Paths of every artifact under an output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn clean_panel(&self) -> PathBuf {
        self.root.join("data").join("data_clean.csv")
    }

    /// Where ZIP sources are extracted.
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn model(&self, stem: &str) -> PathBuf {
        self.root.join("models").join(format!("{stem}.json"))
    }

    pub fn table(&self, stem: &str) -> PathBuf {
        self.root.join("tables").join(format!("{stem}.tex"))
    }

    pub fn figure(&self, stem: &str) -> PathBuf {
        self.root.join("figures").join(format!("{stem}.svg"))
    }

    pub fn sensitivity(&self, name: &str) -> PathBuf {
        self.root.join("sensitivity").join(format!("{name}.json"))
    }
}

/// Fitted models of the estimate stage, keyed by artifact stem.
#[derive(Debug, Clone, Default)]
pub struct EstimateOutput {
    pub models: BTreeMap<String, FittedModel>,
    /// Stems of the units that failed (already logged).
    pub failed: Vec<String>,
}

/// Everything the sensitivity stage computed.
#[derive(Debug, Clone, Default)]
pub struct SensitivityOutput {
    /// Chow p-values, feature -> date -> p.
    pub pvalues: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    /// Breakpoint-dummy refits keyed by artifact stem.
    pub refits: BTreeMap<String, BreakpointRefit>,
    /// Sub-sample fits keyed by artifact stem.
    pub subsamples: BTreeMap<String, FittedModel>,
    pub failed: Vec<String>,
}

/// Load, clean, merge and transform the configured sources, then write the
/// clean panel.
pub fn build_panel(cfg: &StudyConfig, layout: &OutputLayout) -> Result<Panel, AppError> {
    if cfg.sources.is_empty() {
        return Err(AppError::Config("`sources` is empty: nothing to clean.".into()));
    }
    let archive = ArchiveOptions {
        dest_dir: Some(layout.raw_dir()),
        member: cfg.zip_member.clone(),
    };
    let frames = load_sources(&cfg.sources, &archive)?;
    let frames = clean_data(&frames, &cfg.schema)?;
    let mut panel = merge(&frames, TIME, cfg.end_date, cfg.join)?;

    if let Some(var) = &cfg.detrend {
        panel = detrend(&panel, var, 1, None)?;
    }
    if let Some(var) = &cfg.growth_rate {
        panel = growth_rate(&panel, var)?;
    }
    panel = panel.renamed(
        cfg.schema
            .column_rename_mapping
            .iter()
            .map(|(from, to)| (from.as_str(), to.as_str())),
    )?;
    if let Some(exp) = &cfg.expectations {
        panel = backward_expectations(&panel, &exp.variable, exp.window)?;
    }

    let path = layout.clean_panel();
    write_panel_csv(&path, &panel)?;
    info!(
        path = %path.display(),
        rows = panel.len(),
        columns = panel.column_names().len(),
        "wrote clean panel"
    );
    Ok(panel)
}

/// Read the clean panel from `path`, or from the layout's default location.
pub fn load_panel(layout: &OutputLayout, path: Option<&Path>) -> Result<Panel, AppError> {
    let path = path.map_or_else(|| layout.clean_panel(), Path::to_path_buf);
    read_panel_csv(&path, INDEX_COLUMN)
}

/// Fit every full-sample unit of the grid in parallel.
///
/// Each unit writes `models/{stem}.json`, `tables/{stem}.tex` and (with
/// `plots`) `figures/{stem}.svg`. A failing unit is logged and skipped; the
/// stage only fails when no unit succeeds.
pub fn run_estimations(
    panel: &Panel,
    cfg: &EstimationConfig,
    grid: &StudyGrid,
    layout: &OutputLayout,
    plots: bool,
) -> Result<EstimateOutput, AppError> {
    let outcome = cfg.outcome.evaluate(panel)?;

    let results: Vec<(String, Result<FittedModel, AppError>)> = grid
        .estimations
        .par_iter()
        .map(|unit| {
            let result = estimate_unit(panel, &outcome, cfg, unit, layout, plots);
            (unit.artifact_stem(), result)
        })
        .collect();

    let (models, failed) = settle("estimate", results)?;
    info!(fitted = models.len(), failed = failed.len(), "estimation grid done");
    Ok(EstimateOutput { models, failed })
}

fn estimate_unit(
    panel: &Panel,
    outcome: &Series,
    cfg: &EstimationConfig,
    unit: &EstimationUnit,
    layout: &OutputLayout,
    plots: bool,
) -> Result<FittedModel, AppError> {
    let f1 = feature_def(&cfg.features_1, &unit.feature_1)?.evaluate(panel)?;
    let f2 = feature_def(&cfg.features_2, &unit.feature_2)?.evaluate(panel)?;
    let model = fit_with(outcome, &[f1.clone(), f2.clone()], unit.method, &cfg.fit)?;
    write_model(layout, &unit.artifact_stem(), &model)?;

    if plots {
        let figure_stem = unit.figure_stem();
        let figure = RegressionFigure::from_model(&model, outcome, &f1, &f2, &figure_stem)?;
        write_regression_svg(&layout.figure(&figure_stem), &figure, FIGURE_SIZE)?;
    }
    Ok(model)
}

/// Breakpoint analysis of the fitted grid:
///
/// - Chow p-values of every feature at every candidate break
///   (`sensitivity/breakpoints.json`)
/// - one breakpoint-dummy refit per feature and method
/// - sub-sample re-estimation from each anchor date
pub fn run_sensitivity(
    panel: &Panel,
    cfg: &EstimationConfig,
    grid: &StudyGrid,
    layout: &OutputLayout,
    policy: BreakPolicy,
) -> Result<SensitivityOutput, AppError> {
    let outcome = cfg.outcome.evaluate(panel)?;
    let features = named_series(&cfg.features_1, panel)?.merged(&named_series(&cfg.features_2, panel)?);

    let pvalue_results = vec![(
        "breakpoints".to_string(),
        breakpoint_pvalues(panel, &outcome, &features, &cfg.breakpoints).and_then(|pvalues| {
            write_json(&layout.sensitivity("breakpoints"), &pvalues)?;
            info!(features = pvalues.len(), dates = cfg.breakpoints.len(), "wrote breakpoint p-values");
            Ok(pvalues)
        }),
    )];

    let refit_results: Vec<(String, Result<BreakpointRefit, AppError>)> = grid
        .breaks
        .par_iter()
        .map(|unit| {
            let stem = unit.artifact_stem();
            let result = features
                .get(&unit.feature)
                .ok_or_else(|| AppError::MissingColumn(unit.feature.clone()))
                .and_then(|feature| {
                    refit_with_breakpoints(
                        panel,
                        &outcome,
                        feature,
                        &cfg.breakpoints,
                        unit.method.as_str(),
                        &cfg.fit,
                        policy,
                    )
                })
                .and_then(|refit| {
                    write_model(layout, &stem, &refit.model)?;
                    Ok(refit)
                });
            (stem, result)
        })
        .collect();

    let subsample_results = run_subsamples(panel, cfg, grid, layout);

    let (mut tables, mut failed, pvalue_err) = partition("breakpoint p-values", pvalue_results);
    let (refits, refit_failed, refit_err) = partition("breakpoint refit", refit_results);
    let (subsamples, sub_failed, sub_err) = partition("sub-sample", subsample_results);
    if tables.is_empty() && refits.is_empty() && subsamples.is_empty() {
        if let Some(err) = pvalue_err.or(refit_err).or(sub_err) {
            return Err(err);
        }
    }
    failed.extend(refit_failed);
    failed.extend(sub_failed);
    let pvalues = tables.remove("breakpoints").unwrap_or_default();

    let dummies: BTreeMap<&str, &[NaiveDate]> = refits
        .iter()
        .map(|(stem, refit)| (stem.as_str(), refit.break_dates.as_slice()))
        .collect();
    write_json(&layout.sensitivity("break_dummies"), &dummies)?;

    info!(
        refits = refits.len(),
        subsamples = subsamples.len(),
        failed = failed.len(),
        "sensitivity analysis done"
    );
    Ok(SensitivityOutput {
        pvalues,
        refits,
        subsamples,
        failed,
    })
}

/// Sub-sample fits, one batch per `(method, anchor)` in parallel, mapped back
/// onto the grid's sensitivity units.
fn run_subsamples(
    panel: &Panel,
    cfg: &EstimationConfig,
    grid: &StudyGrid,
    layout: &OutputLayout,
) -> Vec<(String, Result<FittedModel, AppError>)> {
    let jobs: BTreeSet<(Method, NaiveDate)> = grid
        .sensitivity
        .iter()
        .filter_map(|unit| unit.breakpoint.map(|date| (unit.method, date)))
        .collect();

    let batches: BTreeMap<(Method, NaiveDate), Result<BTreeMap<String, FittedModel>, String>> = jobs
        .into_par_iter()
        .map(|(method, anchor)| {
            let batch = subsample_fits(
                panel,
                &cfg.outcome,
                &cfg.features_1,
                &cfg.features_2,
                &[anchor],
                method.as_str(),
                &cfg.fit,
            )
            .map(|mut by_anchor| by_anchor.remove(&anchor).unwrap_or_default())
            .map_err(|e| e.to_string());
            ((method, anchor), batch)
        })
        .collect();

    grid.sensitivity
        .par_iter()
        .map(|unit| {
            let stem = unit.artifact_stem();
            let result = unit
                .breakpoint
                .and_then(|anchor| batches.get(&(unit.method, anchor)))
                .ok_or_else(|| AppError::usage(format!("Unit `{stem}` has no sub-sample batch.")))
                .and_then(|batch| batch.as_ref().map_err(|e| AppError::usage(e.clone())))
                .and_then(|batch| {
                    batch
                        .get(&batch_key(&unit.feature_1, &unit.feature_2))
                        .cloned()
                        .ok_or_else(|| AppError::usage(format!("Sub-sample batch has no model for `{stem}`.")))
                })
                .and_then(|model| {
                    write_model(layout, &stem, &model)?;
                    Ok(model)
                });
            (stem, result)
        })
        .collect()
}

fn feature_def<'a>(defs: &'a [FeatureDef], name: &str) -> Result<&'a FeatureDef, AppError> {
    defs.iter()
        .find(|d| d.name == name)
        .ok_or_else(|| AppError::Config(format!("No feature named `{name}`.")))
}

fn write_model(layout: &OutputLayout, stem: &str, model: &FittedModel) -> Result<(), AppError> {
    model.save(&layout.model(stem))?;
    write_text(&layout.table(stem), &model.to_latex(Some(stem))?)
}

/// Split per-unit results into successes and logged failures.
///
/// Fails with the first error when every unit failed.
fn settle<T>(
    stage: &str,
    results: Vec<(String, Result<T, AppError>)>,
) -> Result<(BTreeMap<String, T>, Vec<String>), AppError> {
    match partition(stage, results) {
        (ok, _, Some(err)) if ok.is_empty() => Err(err),
        (ok, failed, _) => Ok((ok, failed)),
    }
}

/// Successes, failed stems (each logged) and the first error.
fn partition<T>(
    stage: &str,
    results: Vec<(String, Result<T, AppError>)>,
) -> (BTreeMap<String, T>, Vec<String>, Option<AppError>) {
    let mut ok = BTreeMap::new();
    let mut failed = Vec::new();
    let mut first_err = None;
    for (stem, result) in results {
        match result {
            Ok(value) => {
                ok.insert(stem, value);
            }
            Err(err) => {
                warn!(stage, unit = %stem, error = %err, "unit failed");
                failed.push(stem);
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }
    (ok, failed, first_err)
}
