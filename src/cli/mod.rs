//! Command-line parsing for the NKPC estimation pipeline.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! pipeline and the estimation code.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::data::DEFAULT_QUARTERS;
use crate::sensitivity::BreakPolicy;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "nkpc", version, about = "New Keynesian Phillips Curve estimation pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load, clean, merge and transform the raw sources into the clean panel.
    Clean(CleanArgs),
    /// Fit the estimation grid on the clean panel; write models, tables and figures.
    Estimate(EstimateArgs),
    /// Breakpoint p-values, dummy refits and sub-sample re-estimation.
    Sensitivity(SensitivityArgs),
    /// Clean, estimate and run the sensitivity analysis in one go.
    Run(RunArgs),
    /// Print the summary of a saved model.
    Table(TableArgs),
    /// Write a synthetic clean panel (for smoke runs without the raw data).
    Simulate(SimulateArgs),
}

/// Options shared by every command that reads a study file.
#[derive(Debug, Parser, Clone)]
pub struct StudyArgs {
    /// Study configuration (YAML). Omit to use the built-in NKPC study.
    #[arg(short, long, value_name = "YAML")]
    pub config: Option<PathBuf>,

    /// Output root for artifacts.
    #[arg(short, long, value_name = "DIR", default_value = "bld")]
    pub out: PathBuf,
}

#[derive(Debug, Parser, Clone)]
pub struct CleanArgs {
    #[command(flatten)]
    pub study: StudyArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct EstimateArgs {
    #[command(flatten)]
    pub study: StudyArgs,

    /// Clean panel CSV (default: `<out>/data/data_clean.csv`).
    #[arg(long, value_name = "CSV")]
    pub panel: Option<PathBuf>,

    /// Skip the SVG figures.
    #[arg(long)]
    pub no_plots: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct SensitivityArgs {
    #[command(flatten)]
    pub study: StudyArgs,

    /// Clean panel CSV (default: `<out>/data/data_clean.csv`).
    #[arg(long, value_name = "CSV")]
    pub panel: Option<PathBuf>,

    /// Which significant breaks get a dummy in the refit.
    #[arg(long, value_enum, default_value_t = PolicyArg::LastSignificant)]
    pub policy: PolicyArg,
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub study: StudyArgs,

    /// Skip the SVG figures.
    #[arg(long)]
    pub no_plots: bool,

    #[arg(long, value_enum, default_value_t = PolicyArg::LastSignificant)]
    pub policy: PolicyArg,
}

#[derive(Debug, Parser, Clone)]
pub struct TableArgs {
    /// Model JSON written by `nkpc estimate`.
    #[arg(long, value_name = "JSON")]
    pub model: PathBuf,

    /// Print the LaTeX table instead of the text summary.
    #[arg(long)]
    pub latex: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Destination CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    /// Number of quarters, starting 1960Q1.
    #[arg(long, default_value_t = DEFAULT_QUARTERS)]
    pub quarters: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// CLI spelling of `BreakPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    LastSignificant,
    Cumulative,
}

impl From<PolicyArg> for BreakPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::LastSignificant => BreakPolicy::LastSignificant,
            PolicyArg::Cumulative => BreakPolicy::Cumulative,
        }
    }
}
