//! `nkpc` library crate.
//!
//! Estimates New Keynesian Phillips Curve specifications on US quarterly
//! data: source cleaning and merging, OLS with residual diagnostics and an
//! automatic HAC refit, structural-break sensitivity analysis, and LaTeX/SVG
//! reporting.
//!
//! The binary (`nkpc`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - every pipeline stage can be driven from code as well as the CLI

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod plot;
pub mod report;
pub mod sensitivity;
