//! Study configuration.
//!
//! - `study`: the YAML document (sources, cleaning schema, transforms, estimation)
//! - `series`: feature/outcome definitions evaluated against a panel
//! - `grid`: the validated list of estimation units

pub mod grid;
pub mod series;
pub mod study;

pub use grid::*;
pub use series::*;
pub use study::*;
