//! Sensitivity of the fitted relations to structural breaks and sample start.

pub mod breakpoints;
pub mod chow;

pub use breakpoints::*;
pub use chow::*;
