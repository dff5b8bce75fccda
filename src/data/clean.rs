//! Per-source cleaning.
//!
//! Each raw source frame is reduced to its value column (renamed to the
//! source key) plus a parsed `TIME` column, ready for merging.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use crate::config::DataSchema;
use crate::domain::{Column, Frame, parse_date, quarter_start};
use crate::error::AppError;

/// Name of the shared time key after cleaning.
pub const TIME: &str = "TIME";

/// Clean every loaded source.
pub fn clean_data(
    frames: &BTreeMap<String, Frame>,
    schema: &DataSchema,
) -> Result<BTreeMap<String, Frame>, AppError> {
    frames
        .iter()
        .map(|(key, frame)| Ok((key.clone(), clean_frame(key, frame, schema)?)))
        .collect()
}

/// Clean one source frame.
///
/// 1. keep only `variables_to_keep` and `dates_to_keep` columns
/// 2. rename the kept value column to `key`
/// 3. normalize the date columns into `TIME`
/// 4. take logs when `key` is listed in `log_transform`
pub fn clean_frame(key: &str, frame: &Frame, schema: &DataSchema) -> Result<Frame, AppError> {
    let mut keep = schema.variables_to_keep.clone();
    keep.extend(schema.dates_to_keep.iter().cloned());
    let mut out = frame.select(&keep);

    for var in &schema.variables_to_keep {
        if out.has_column(var) {
            out = out.renamed(var, key)?;
        }
    }

    for date_col in &schema.dates_to_keep {
        if !out.has_column(date_col) {
            continue;
        }
        match date_col.as_str() {
            "DATE" | "date" => {
                let parsed = parse_date_column(date_col, out.column(date_col)?)?;
                out = out.without(&[date_col.as_str()]).with_column(TIME, parsed)?;
            }
            "TIME" => {
                let parsed = parse_date_column(date_col, out.column(date_col)?)?;
                out = out.with_column(TIME, parsed)?;
            }
            "Quarter" => {
                let parsed = year_quarter_column(out.column("Year")?, out.column("Quarter")?)?;
                out = out.without(&["Year", "Quarter"]).with_column(TIME, parsed)?;
            }
            _ => {}
        }
    }

    if schema.log_transform.iter().any(|v| v == key) && out.has_column(key) {
        let logged = match out.column(key)? {
            Column::Float(values) => Column::Float(values.iter().map(|v| v.ln()).collect()),
            other => {
                return Err(AppError::usage(format!(
                    "Cannot log-transform `{key}`: column is {}.",
                    other.kind()
                )));
            }
        };
        out = out.with_column(key, logged)?;
    }

    debug!(source = key, columns = ?out.names(), rows = out.n_rows(), "cleaned source");
    Ok(out)
}

/// Parse a date-like column into `Column::Date`.
pub fn parse_date_column(name: &str, column: &Column) -> Result<Column, AppError> {
    Ok(Column::Date(parse_dates(name, column)?))
}

/// Parse every cell of a date-like column.
pub fn parse_dates(name: &str, column: &Column) -> Result<Vec<NaiveDate>, AppError> {
    if let Column::Date(dates) = column {
        return Ok(dates.clone());
    }
    (0..column.len())
        .map(|i| {
            let raw = column.cell_text(i).unwrap_or_default();
            parse_date(&raw).ok_or_else(|| {
                AppError::usage(format!("Column `{name}` row {i}: cannot parse '{raw}' as a date."))
            })
        })
        .collect()
}

/// Combine `Year` and `Quarter` columns into quarter-start dates.
fn year_quarter_column(year: &Column, quarter: &Column) -> Result<Column, AppError> {
    let dates = (0..year.len())
        .map(|i| {
            let y = year.cell_text(i).unwrap_or_default();
            let q = quarter.cell_text(i).unwrap_or_default();
            let parsed = integer_cell(&y).and_then(|y| {
                let q = integer_cell(q.trim().trim_start_matches(['Q', 'q']))?;
                quarter_start(i32::try_from(y).ok()?, u32::try_from(q).ok()?)
            });
            parsed.ok_or_else(|| {
                AppError::usage(format!("Row {i}: cannot build a quarter from Year='{y}', Quarter='{q}'."))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Column::Date(dates))
}

/// `"1960"` or `"1960.0"` -> 1960.
fn integer_cell(raw: &str) -> Option<i64> {
    let v: f64 = raw.trim().parse().ok()?;
    (v.fract() == 0.0).then_some(v as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn text(cells: &[&str]) -> Column {
        Column::Text(cells.iter().map(|s| s.to_string()).collect())
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn oecd_frame_keeps_value_and_time() {
        let frame = Frame::new(vec![
            ("LOCATION".into(), text(&["USA", "USA"])),
            ("TIME".into(), text(&["1960-Q1", "1960-Q2"])),
            ("Value".into(), Column::Float(vec![1.0, 2.0])),
        ])
        .unwrap();

        let out = clean_frame("CPI", &frame, &DataSchema::default()).unwrap();
        assert_eq!(out.names(), &["TIME".to_string(), "CPI".to_string()]);
        assert_eq!(
            out.column("TIME").unwrap(),
            &Column::Date(vec![ymd(1960, 1, 1), ymd(1960, 4, 1)])
        );
    }

    #[test]
    fn fred_frame_moves_date_to_time_and_logs() {
        let frame = Frame::new(vec![
            ("DATE".into(), text(&["1947-01-01", "1947-04-01"])),
            ("GDP".into(), Column::Float(vec![1.0, std::f64::consts::E])),
        ])
        .unwrap();

        let out = clean_frame("GDP", &frame, &DataSchema::default()).unwrap();
        assert!(!out.has_column("DATE"));
        match out.column("GDP").unwrap() {
            Column::Float(v) => {
                assert_relative_eq!(v[0], 0.0);
                assert_relative_eq!(v[1], 1.0);
            }
            other => panic!("unexpected column {other:?}"),
        }
    }

    #[test]
    fn year_and_quarter_become_time() {
        let frame = Frame::new(vec![
            ("Year".into(), Column::Float(vec![1990.0, 1990.0])),
            ("Quarter".into(), Column::Float(vec![3.0, 4.0])),
            ("Value".into(), Column::Float(vec![80.1, 79.4])),
        ])
        .unwrap();

        let out = clean_frame("MSC", &frame, &DataSchema::default()).unwrap();
        assert!(!out.has_column("Year") && !out.has_column("Quarter"));
        assert_eq!(
            out.column("TIME").unwrap(),
            &Column::Date(vec![ymd(1990, 7, 1), ymd(1990, 10, 1)])
        );
    }

    #[test]
    fn quarter_without_year_is_missing_column() {
        let frame = Frame::new(vec![
            ("Quarter".into(), Column::Float(vec![1.0])),
            ("Value".into(), Column::Float(vec![1.0])),
        ])
        .unwrap();
        assert!(matches!(
            clean_frame("MSC", &frame, &DataSchema::default()),
            Err(AppError::MissingColumn(c)) if c == "Year"
        ));
    }

    #[test]
    fn bad_date_is_a_usage_error() {
        let frame = Frame::new(vec![("date".into(), text(&["soon"])), ("NAIRU".into(), Column::Float(vec![5.0]))])
            .unwrap();
        assert!(matches!(
            clean_frame("NAIRU", &frame, &DataSchema::default()),
            Err(AppError::Usage(_))
        ));
    }
}
