//! Read/write fitted model files.
//!
//! A model file is the portable representation of one estimation unit:
//! - the fitted model (coefficients, covariance, residuals, diagnostics)
//! - a small envelope identifying the producing tool and format version
//!
//! Files are pretty-printed JSON so they diff well between runs.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::fit::FittedModel;

const TOOL: &str = "nkpc";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    tool: String,
    version: u32,
    model: FittedModel,
}

/// Write a model file, creating parent directories as needed.
pub fn save_model(path: &Path, model: &FittedModel) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create model file '{}'", path.display()), e))?;

    let envelope = ModelFile {
        tool: TOOL.to_string(),
        version: FORMAT_VERSION,
        model: model.clone(),
    };
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &envelope)
        .map_err(|e| AppError::usage(format!("Failed to write model file '{}': {e}", path.display())))?;
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush model file '{}'", path.display()), e))
}

/// Read a model file.
pub fn load_model(path: &Path) -> Result<FittedModel, AppError> {
    if !path.is_file() {
        return Err(AppError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open model file '{}'", path.display()), e))?;
    let envelope: ModelFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| AppError::usage(format!("Invalid model file '{}': {e}", path.display())))?;

    if envelope.version != FORMAT_VERSION {
        return Err(AppError::usage(format!(
            "Unsupported model file version {} in '{}'.",
            envelope.version,
            path.display()
        )));
    }
    Ok(envelope.model)
}

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::io(format!("Failed to create '{}'", parent.display()), e))?;
    }
    Ok(())
}
