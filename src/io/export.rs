//! Clean-panel CSV persistence plus small JSON/text writers for reports.
//!
//! The clean panel is the hand-off point between data management and
//! estimation, so it is written as a plain CSV anyone can open: an index
//! column (`TIME` by default) followed by one column per series.

use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::data::parse_dates;
use crate::domain::{Column, Panel};
use crate::error::AppError;
use crate::io::ingest::read_csv_file;
use crate::io::model_file::ensure_parent;

/// Name of the index column in the clean panel CSV.
pub const INDEX_COLUMN: &str = "TIME";

/// Write a panel to CSV. Missing values are written as empty cells.
pub fn write_panel_csv(path: &Path, panel: &Panel) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create panel CSV '{}'", path.display()), e))?;
    let mut writer = csv::Writer::from_writer(file);

    let csv_err = |e: csv::Error| AppError::usage(format!("Failed to write panel CSV: {e}"));

    let mut header = vec![INDEX_COLUMN.to_string()];
    header.extend(panel.column_names().iter().cloned());
    writer.write_record(&header).map_err(csv_err)?;

    let columns: Vec<&[f64]> = panel
        .column_names()
        .iter()
        .map(|name| panel.column(name))
        .collect::<Result<_, _>>()?;

    for (i, date) in panel.index().iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(date.to_string());
        for col in &columns {
            let v = col[i];
            row.push(if v.is_nan() { String::new() } else { format!("{v}") });
        }
        writer.write_record(&row).map_err(csv_err)?;
    }

    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush panel CSV '{}'", path.display()), e))
}

/// Read a panel written by `write_panel_csv` (or any CSV with a date index).
pub fn read_panel_csv(path: &Path, index_col: &str) -> Result<Panel, AppError> {
    if !path.is_file() {
        return Err(AppError::NotFound(path.to_path_buf()));
    }
    let frame = read_csv_file(path)?;

    let index = parse_dates(index_col, frame.column(index_col)?)?;

    let mut columns = Vec::new();
    for (name, column) in frame.iter() {
        if name == index_col {
            continue;
        }
        match column {
            Column::Float(values) => columns.push((name.to_string(), values.clone())),
            // A column with no values at all is read back as text.
            Column::Text(cells) if cells.iter().all(|c| c.trim().is_empty()) => {
                columns.push((name.to_string(), vec![f64::NAN; cells.len()]));
            }
            other => {
                return Err(AppError::usage(format!(
                    "Panel column `{name}` is {} but must be numeric.",
                    other.kind()
                )));
            }
        }
    }

    Panel::new(index, columns)
}

/// Write any serializable value as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    ensure_parent(path)?;
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}'", path.display()), e))?;
    serde_json::to_writer_pretty(file, value)
        .map_err(|e| AppError::usage(format!("Failed to write JSON '{}': {e}", path.display())))
}

/// Write a text artifact (e.g. a LaTeX table).
pub fn write_text(path: &Path, body: &str) -> Result<(), AppError> {
    ensure_parent(path)?;
    std::fs::write(path, body)
        .map_err(|e| AppError::io(format!("Failed to write '{}'", path.display()), e))
}
