//! Regression fitting.
//!
//! Responsibilities:
//!
//! - OLS fits of an outcome on one or more feature series
//! - residual diagnostics (Breusch-Godfrey, Breusch-Pagan)
//! - Newey-West HAC covariance when a diagnostic rejects

pub mod diagnostics;
pub mod fitter;
pub mod hac;
pub mod model;

pub use diagnostics::*;
pub use fitter::*;
pub use model::*;
