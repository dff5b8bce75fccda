//! Input/output helpers.
//!
//! - raw source ingest: CSV + ZIP-of-CSV (`ingest`)
//! - clean panel CSV and report writers (`export`)
//! - fitted model JSON read/write (`model_file`)

pub mod export;
pub mod ingest;
pub mod model_file;

pub use export::*;
pub use ingest::*;
pub use model_file::*;
