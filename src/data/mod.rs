//! Data management: cleaning raw sources into the shared panel.

pub mod clean;
pub mod sample;
pub mod transform;

pub use clean::*;
pub use sample::*;
pub use transform::*;
