//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - installs the tracing subscriber
//! - parses CLI arguments
//! - loads the study configuration
//! - dispatches to the pipeline stages and prints reports

use std::path::Path;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{
    CleanArgs, Command, EstimateArgs, RunArgs, SensitivityArgs, SimulateArgs, StudyArgs, TableArgs,
};
use crate::config::{StudyConfig, StudyGrid, build_grid};
use crate::data::{SampleConfig, generate_panel};
use crate::domain::Panel;
use crate::error::AppError;
use crate::fit::FittedModel;
use crate::io::write_panel_csv;
use crate::sensitivity::BreakPolicy;

pub mod pipeline;

use pipeline::OutputLayout;

/// Entry point for the `nkpc` binary.
pub fn run() -> Result<(), AppError> {
    init_tracing();
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Clean(args) => handle_clean(args),
        Command::Estimate(args) => handle_estimate(args),
        Command::Sensitivity(args) => handle_sensitivity(args),
        Command::Run(args) => handle_run(args),
        Command::Table(args) => handle_table(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second install (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Study file (or the built-in study) plus its validated grid.
fn load_study(args: &StudyArgs) -> Result<(StudyConfig, StudyGrid), AppError> {
    let cfg = match &args.config {
        Some(path) => StudyConfig::load(path)?,
        None => StudyConfig::default(),
    };
    let grid = build_grid(&cfg.estimation)?;
    info!(
        estimations = grid.estimations.len(),
        sensitivity = grid.sensitivity.len(),
        breaks = grid.breaks.len(),
        "study grid"
    );
    Ok((cfg, grid))
}

fn handle_clean(args: CleanArgs) -> Result<(), AppError> {
    let (cfg, _) = load_study(&args.study)?;
    let layout = OutputLayout::new(&args.study.out);
    let panel = pipeline::build_panel(&cfg, &layout)?;
    print_panel(&panel, &layout.clean_panel());
    Ok(())
}

fn handle_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let (cfg, grid) = load_study(&args.study)?;
    let layout = OutputLayout::new(&args.study.out);
    let panel = pipeline::load_panel(&layout, args.panel.as_deref())?;
    estimate(&panel, &cfg, &grid, &layout, !args.no_plots)
}

fn handle_sensitivity(args: SensitivityArgs) -> Result<(), AppError> {
    let (cfg, grid) = load_study(&args.study)?;
    let layout = OutputLayout::new(&args.study.out);
    let panel = pipeline::load_panel(&layout, args.panel.as_deref())?;
    sensitivity(&panel, &cfg, &grid, &layout, args.policy.into())
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let (cfg, grid) = load_study(&args.study)?;
    let layout = OutputLayout::new(&args.study.out);
    let panel = pipeline::build_panel(&cfg, &layout)?;
    print_panel(&panel, &layout.clean_panel());
    estimate(&panel, &cfg, &grid, &layout, !args.no_plots)?;
    sensitivity(&panel, &cfg, &grid, &layout, args.policy.into())
}

fn handle_table(args: TableArgs) -> Result<(), AppError> {
    let model = FittedModel::load(&args.model)?;
    let body = if args.latex {
        let caption = args.model.file_stem().map(|s| s.to_string_lossy().into_owned());
        model.to_latex(caption.as_deref())?
    } else {
        model.summary()?
    };
    print!("{body}");
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let cfg = SampleConfig {
        quarters: args.quarters,
        seed: args.seed,
        ..SampleConfig::default()
    };
    let panel = generate_panel(&cfg)?;
    write_panel_csv(&args.out, &panel)?;
    print_panel(&panel, &args.out);
    Ok(())
}

fn estimate(
    panel: &Panel,
    cfg: &StudyConfig,
    grid: &StudyGrid,
    layout: &OutputLayout,
    plots: bool,
) -> Result<(), AppError> {
    let out = pipeline::run_estimations(panel, &cfg.estimation, grid, layout, plots)?;
    let rows: Vec<(String, &FittedModel)> = out.models.iter().map(|(k, m)| (k.clone(), m)).collect();
    println!("{}", crate::report::format_estimation_table(&rows));
    if !out.failed.is_empty() {
        println!("Failed units: {}", out.failed.join(", "));
    }
    Ok(())
}

fn sensitivity(
    panel: &Panel,
    cfg: &StudyConfig,
    grid: &StudyGrid,
    layout: &OutputLayout,
    policy: BreakPolicy,
) -> Result<(), AppError> {
    let out = pipeline::run_sensitivity(panel, &cfg.estimation, grid, layout, policy)?;
    println!("Chow test p-values:");
    println!("{}", crate::report::format_breakpoint_table(&out.pvalues));
    for (stem, refit) in &out.refits {
        let dates: Vec<String> = refit.break_dates.iter().map(|d| d.to_string()).collect();
        let dates = if dates.is_empty() { "none".to_string() } else { dates.join(", ") };
        println!("{stem}: break dummies at {dates}");
    }
    let rows: Vec<(String, &FittedModel)> = out.subsamples.iter().map(|(k, m)| (k.clone(), m)).collect();
    println!("\n{}", crate::report::format_estimation_table(&rows));
    if !out.failed.is_empty() {
        println!("Failed units: {}", out.failed.join(", "));
    }
    Ok(())
}

fn print_panel(panel: &Panel, path: &Path) {
    let span = match (panel.index().first(), panel.index().last()) {
        (Some(first), Some(last)) => format!("{first} .. {last}"),
        _ => "empty".to_string(),
    };
    println!(
        "{} quarters ({span}), columns: {}",
        panel.len(),
        panel.column_names().join(", ")
    );
    println!("Wrote {}", path.display());
}
