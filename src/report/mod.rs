//! Reporting: regression summaries, LaTeX tables and sensitivity tables.

pub mod format;

pub use format::*;
