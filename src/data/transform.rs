//! Merging and panel transforms.
//!
//! Every function takes a panel by reference and returns a new one, so each
//! stage of the cleaning pipeline can be tested on its own.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data::clean::parse_dates;
use crate::domain::{Column, Frame, Panel};
use crate::error::AppError;
use crate::math::least_squares;

/// How rows are matched across sources when merging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// Keep only dates present in every source.
    #[default]
    Inner,
    /// Keep every date; absent values are `NaN`.
    Outer,
}

/// Merge cleaned frames on `key` into a panel truncated at `end_date`.
pub fn merge(
    frames: &BTreeMap<String, Frame>,
    key: &str,
    end_date: NaiveDate,
    join: JoinKind,
) -> Result<Panel, AppError> {
    if frames.is_empty() {
        return Err(AppError::usage("Nothing to merge: no source frames were given."));
    }

    struct Keyed {
        rows: HashMap<NaiveDate, usize>,
        columns: Vec<(String, Vec<f64>)>,
    }

    let mut keyed = Vec::with_capacity(frames.len());
    let mut seen_columns = BTreeSet::new();
    for (source, frame) in frames {
        let dates = parse_dates(key, frame.column(key)?)?;
        let mut rows = HashMap::with_capacity(dates.len());
        for (i, date) in dates.iter().enumerate() {
            if rows.insert(*date, i).is_some() {
                return Err(AppError::usage(format!(
                    "Source `{source}` has more than one row for {date}."
                )));
            }
        }

        let mut columns = Vec::new();
        for (name, column) in frame.iter() {
            if name == key {
                continue;
            }
            let Column::Float(values) = column else {
                return Err(AppError::usage(format!(
                    "Source `{source}` column `{name}` is {} but must be numeric.",
                    column.kind()
                )));
            };
            if !seen_columns.insert(name.to_string()) {
                return Err(AppError::usage(format!(
                    "Column `{name}` appears in more than one source."
                )));
            }
            columns.push((name.to_string(), values.clone()));
        }
        keyed.push(Keyed { rows, columns });
    }

    let index: Vec<NaiveDate> = match join {
        JoinKind::Inner => {
            let mut common: BTreeSet<NaiveDate> = keyed[0].rows.keys().copied().collect();
            for k in &keyed[1..] {
                common.retain(|d| k.rows.contains_key(d));
            }
            common.into_iter().collect()
        }
        JoinKind::Outer => keyed
            .iter()
            .flat_map(|k| k.rows.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };
    let index: Vec<NaiveDate> = index.into_iter().filter(|d| *d <= end_date).collect();

    let mut columns = Vec::new();
    for k in &keyed {
        for (name, values) in &k.columns {
            let aligned = index
                .iter()
                .map(|d| k.rows.get(d).map_or(f64::NAN, |&i| values[i]))
                .collect();
            columns.push((name.clone(), aligned));
        }
    }

    let panel = Panel::new(index, columns)?;
    info!(
        sources = frames.len(),
        rows = panel.len(),
        columns = panel.column_names().len(),
        "merged sources"
    );
    Ok(panel)
}

/// Add `{var}_growth_rate` (percent change on the previous row) and drop
/// rows with any missing value.
pub fn growth_rate(panel: &Panel, var: &str) -> Result<Panel, AppError> {
    let values = panel.column(var)?;
    let growth = std::iter::once(f64::NAN)
        .chain(values.windows(2).map(|w| (w[1] / w[0] - 1.0) * 100.0))
        .take(values.len())
        .collect();
    Ok(panel.with_column(&format!("{var}_growth_rate"), growth)?.dropna())
}

/// Subtract a polynomial time trend from `var`.
///
/// The trend is fitted by least squares on `t = 0, 1, ..` over the rows where
/// `var` is finite. The result is stored as `name` (default `{var}_detrended`).
pub fn detrend(panel: &Panel, var: &str, order: usize, name: Option<&str>) -> Result<Panel, AppError> {
    if panel.len() < 2 {
        return Err(AppError::usage("Input data must have at least two data points."));
    }
    let values = panel.column(var)?;
    let rows: Vec<usize> = (0..values.len()).filter(|&i| values[i].is_finite()).collect();
    if rows.len() <= order {
        return Err(AppError::usage(format!(
            "Cannot fit a degree-{order} trend to {} finite values of `{var}`.",
            rows.len()
        )));
    }

    let x = DMatrix::from_fn(rows.len(), order + 1, |r, p| (rows[r] as f64).powi(p as i32));
    let y = DVector::from_iterator(rows.len(), rows.iter().map(|&i| values[i]));
    let fit = least_squares(&x, &y)?;

    let detrended = values
        .iter()
        .enumerate()
        .map(|(t, v)| {
            let trend: f64 = fit
                .beta
                .iter()
                .enumerate()
                .map(|(p, b)| b * (t as f64).powi(p as i32))
                .sum();
            v - trend
        })
        .collect();

    let column = name.map_or_else(|| format!("{var}_detrended"), str::to_string);
    debug!(variable = var, order, column = %column, "detrended");
    panel.with_column(&column, detrended)
}

/// Add `Backward_Expectations_{var}`: the trailing mean of the last `window`
/// observations (fewer at the start of the sample), then drop rows with any
/// missing value.
pub fn backward_expectations(panel: &Panel, var: &str, window: usize) -> Result<Panel, AppError> {
    if window == 0 {
        return Err(AppError::usage("Expectations window must be at least 1."));
    }
    let values = panel.column(var)?;
    let expectations = (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let (sum, count) = values[start..=i]
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count == 0 { f64::NAN } else { sum / count as f64 }
        })
        .collect();
    Ok(panel
        .with_column(&format!("Backward_Expectations_{var}"), expectations)?
        .dropna())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn quarters(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| ymd(2000 + (i / 4) as i32, 3 * (i % 4) as u32 + 1, 1))
            .collect()
    }

    fn single(name: &str, values: Vec<f64>) -> Panel {
        Panel::new(quarters(values.len()), vec![(name.to_string(), values)]).unwrap()
    }

    fn source(dates: &[&str], name: &str, values: Vec<f64>) -> Frame {
        Frame::new(vec![
            (
                "TIME".into(),
                Column::Text(dates.iter().map(|s| s.to_string()).collect()),
            ),
            (name.into(), Column::Float(values)),
        ])
        .unwrap()
    }

    #[test]
    fn merge_three_frames() {
        let frames = BTreeMap::from([
            (
                "CPI".to_string(),
                source(&["2022-07-01", "2022-10-01", "2023-01-01"], "CPI", vec![1.0, 2.0, 3.0]),
            ),
            (
                "GDP".to_string(),
                source(&["2022-10-01", "2022-07-01", "2023-01-01"], "GDP", vec![20.0, 10.0, 30.0]),
            ),
            (
                "MSC".to_string(),
                source(&["2022-07-01", "2022-10-01", "2023-01-01"], "MSC", vec![7.0, 8.0, 9.0]),
            ),
        ]);

        let panel = merge(&frames, "TIME", ymd(2022, 10, 1), JoinKind::Inner).unwrap();
        assert_eq!(panel.index(), &[ymd(2022, 7, 1), ymd(2022, 10, 1)]);
        assert_eq!(panel.column_names(), &["CPI", "GDP", "MSC"]);
        assert_eq!(panel.column("GDP").unwrap(), &[10.0, 20.0]);
    }

    #[test]
    fn outer_merge_fills_nan() {
        let frames = BTreeMap::from([
            ("A".to_string(), source(&["2000-01-01", "2000-04-01"], "A", vec![1.0, 2.0])),
            ("B".to_string(), source(&["2000-04-01"], "B", vec![5.0])),
        ]);
        let panel = merge(&frames, "TIME", ymd(2020, 1, 1), JoinKind::Outer).unwrap();
        assert_eq!(panel.len(), 2);
        assert!(panel.column("B").unwrap()[0].is_nan());

        let inner = merge(&frames, "TIME", ymd(2020, 1, 1), JoinKind::Inner).unwrap();
        assert_eq!(inner.index(), &[ymd(2000, 4, 1)]);
    }

    #[test]
    fn merge_on_unknown_key() {
        let frames = BTreeMap::from([("A".to_string(), source(&["2000-01-01"], "A", vec![1.0]))]);
        assert!(matches!(
            merge(&frames, "DATE", ymd(2020, 1, 1), JoinKind::Inner),
            Err(AppError::MissingColumn(c)) if c == "DATE"
        ));
    }

    #[test]
    fn merge_rejects_duplicate_dates() {
        let frames = BTreeMap::from([(
            "A".to_string(),
            source(&["2000-01-01", "2000-01-01"], "A", vec![1.0, 2.0]),
        )]);
        assert!(matches!(
            merge(&frames, "TIME", ymd(2020, 1, 1), JoinKind::Inner),
            Err(AppError::Usage(_))
        ));
    }

    #[test]
    fn growth_rate_in_percent() {
        let panel = single("CPI", vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = growth_rate(&panel, "CPI").unwrap();
        let g = out.column("CPI_growth_rate").unwrap();
        assert_eq!(g.len(), 4);
        assert_relative_eq!(g[0], 100.0, epsilon = 1e-12);
        assert_relative_eq!(g[1], 50.0, epsilon = 1e-12);
        assert_relative_eq!(g[2], 100.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(g[3], 25.0, epsilon = 1e-12);
        assert_eq!(out.index()[0], ymd(2000, 4, 1));
    }

    #[test]
    fn growth_rate_unknown_variable() {
        let panel = single("CPI", vec![1.0, 2.0]);
        assert!(matches!(growth_rate(&panel, "PPI"), Err(AppError::MissingColumn(_))));
    }

    #[test]
    fn backward_expectations_trailing_mean() {
        let panel = single("Inflation", vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let out = backward_expectations(&panel, "Inflation", 4).unwrap();
        let e = out.column("Backward_Expectations_Inflation").unwrap();
        assert_eq!(e, &[1.0, 1.5, 2.0, 2.5, 3.5]);
    }

    #[test]
    fn detrend_removes_linear_trend() {
        let panel = single("GDP", (0..12).map(|t| 3.0 + 0.5 * t as f64).collect());
        let out = detrend(&panel, "GDP", 1, None).unwrap();
        for v in out.column("GDP_detrended").unwrap() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-9);
        }
        // The source column is left untouched.
        assert_eq!(out.column("GDP").unwrap()[1], 3.5);
    }

    #[test]
    fn detrend_needs_two_rows() {
        let panel = single("GDP", vec![1.0]);
        assert!(matches!(detrend(&panel, "GDP", 1, None), Err(AppError::Usage(_))));
    }
}
