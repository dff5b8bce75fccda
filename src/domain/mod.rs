//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - source tables (`Frame`, `Column`)
//! - the merged time-indexed `Panel`
//! - regression inputs (`Series`, `NamedSeries`)
//! - date parsing for the shared time key

pub mod time;
pub mod types;

pub use time::*;
pub use types::*;
