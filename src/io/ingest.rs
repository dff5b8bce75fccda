//! Raw source ingest (CSV and ZIP-of-CSV).
//!
//! This module turns the named raw files of a study into `Frame`s. It knows
//! nothing about which columns matter; that is the cleaner's job.
//!
//! Design goals:
//! - **Closed format set**: dispatch is a `SourceFormat` match, not string
//!   comparisons sprinkled across the loader
//! - **Header probing**: statistical agencies like to put a title block above
//!   the header row, so we probe increasing header offsets until the header
//!   has more than one column
//! - **Clear errors**: missing files, unknown extensions and incomplete
//!   archives are reported before anything is parsed

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::domain::{Column, Frame};
use crate::error::AppError;

/// Name of the CSV the CBO historical-data archive is expected to contain.
pub const DEFAULT_ZIP_MEMBER: &str = "Quarterly_Feb2023.csv";

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    /// A ZIP archive holding one expected CSV member.
    Zip,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(SourceFormat::Csv),
            Some("zip") => Ok(SourceFormat::Zip),
            _ => Err(AppError::usage(
                "Unsupported file format: Only .csv and .zip files are supported.",
            )),
        }
    }
}

/// Where and what to extract when a source is a ZIP archive.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Extraction directory; required as soon as one source is a ZIP.
    pub dest_dir: Option<PathBuf>,
    /// Member expected inside every archive.
    pub member: String,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            dest_dir: None,
            member: DEFAULT_ZIP_MEMBER.to_string(),
        }
    }
}

/// Load every named source into a frame, keyed by source name.
pub fn load_sources(
    sources: &BTreeMap<String, PathBuf>,
    archive: &ArchiveOptions,
) -> Result<BTreeMap<String, Frame>, AppError> {
    let mut frames = BTreeMap::new();
    for (name, path) in sources {
        let frame = load_source(path, archive)?;
        info!(
            source = %name,
            path = %path.display(),
            rows = frame.n_rows(),
            cols = frame.n_cols(),
            "loaded source"
        );
        frames.insert(name.clone(), frame);
    }
    Ok(frames)
}

/// Load a single source file.
pub fn load_source(path: &Path, archive: &ArchiveOptions) -> Result<Frame, AppError> {
    if !path.is_file() {
        return Err(AppError::NotFound(path.to_path_buf()));
    }

    match SourceFormat::from_path(path)? {
        SourceFormat::Csv => read_csv_file(path),
        SourceFormat::Zip => {
            let dest = archive.dest_dir.as_deref().ok_or_else(|| {
                AppError::usage("dest_dir must be specified when reading a zip file.")
            })?;
            let inner = extract_member(path, &archive.member, dest)?;
            read_csv_file(&inner)
        }
    }
}

/// Extract `member` from the archive at `path` into `dest`, returning the
/// extracted file path.
pub fn extract_member(path: &Path, member: &str, dest: &Path) -> Result<PathBuf, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open archive '{}'", path.display()), e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        AppError::usage(format!("Failed to read zip archive '{}': {e}", path.display()))
    })?;

    let mut entry = zip.by_name(member).map_err(|_| {
        AppError::usage(format!(
            "File not found in zip archive: '{member}' is not a member of '{}'.",
            path.display()
        ))
    })?;

    std::fs::create_dir_all(dest)
        .map_err(|e| AppError::io(format!("Failed to create '{}'", dest.display()), e))?;

    let file_name = Path::new(member)
        .file_name()
        .ok_or_else(|| AppError::usage(format!("Invalid archive member name '{member}'.")))?;
    let out_path = dest.join(file_name);
    let mut out = File::create(&out_path)
        .map_err(|e| AppError::io(format!("Failed to create '{}'", out_path.display()), e))?;
    std::io::copy(&mut entry, &mut out)
        .map_err(|e| AppError::io(format!("Failed to extract '{member}'"), e))?;

    debug!(archive = %path.display(), member, to = %out_path.display(), "extracted archive member");
    Ok(out_path)
}

/// Read a CSV file, probing for the first header row with more than one column.
pub fn read_csv_file(path: &Path) -> Result<Frame, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::usage(format!("Error reading csv file {}: {e}", path.display()))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| {
            AppError::usage(format!("Error reading csv file {}: {e}", path.display()))
        })?;
        records.push(record);
    }

    let offset = records
        .iter()
        .position(|r| r.len() > 1)
        .ok_or_else(|| {
            AppError::usage(format!(
                "Error reading csv file {}: no header row with more than one column.",
                path.display()
            ))
        })?;
    if offset > 0 {
        debug!(path = %path.display(), offset, "skipped leading non-data rows");
    }

    let headers = header_names(records[offset].iter());
    let width = headers.len();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); width];
    for record in &records[offset + 1..] {
        if record.iter().all(str::is_empty) {
            continue;
        }
        for (j, col) in cells.iter_mut().enumerate() {
            col.push(record.get(j).unwrap_or("").to_string());
        }
    }

    Frame::new(
        headers
            .into_iter()
            .zip(cells)
            .map(|(name, raw)| (name, Column::from_raw(raw)))
            .collect(),
    )
}

/// Normalize header cells: strip BOMs, name blank headers, de-duplicate.
fn header_names<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (i, name) in raw.enumerate() {
        // Excel likes to emit a BOM before the first header.
        let name = name.trim().trim_start_matches('\u{feff}');
        let mut name = if name.is_empty() {
            format!("Unnamed: {i}")
        } else {
            name.to_string()
        };
        if out.contains(&name) {
            let base = name.clone();
            let mut k = 1;
            while out.contains(&name) {
                name = format!("{base}.{k}");
                k += 1;
            }
        }
        out.push(name);
    }
    out
}
