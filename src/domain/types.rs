//! Shared domain types.
//!
//! - `Frame`: one loaded/cleaned source table with typed columns
//! - `Panel`: the merged, time-indexed table every estimation reads
//! - `Series` / `NamedSeries`: regression inputs derived from a panel
//!
//! Panels are values: every transform returns a new panel and never mutates
//! the one it was given, so estimation units can share one panel freely.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::error::AppError;

/// A typed frame column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Text(Vec<String>),
    /// Numeric values; missing cells are `NaN`.
    Float(Vec<f64>),
    Date(Vec<NaiveDate>),
}

impl Column {
    /// Build a column from raw CSV cells, inferring the type.
    ///
    /// A column is numeric when every non-empty cell parses as `f64` and at
    /// least one cell is non-empty.
    pub fn from_raw(cells: Vec<String>) -> Self {
        let mut any_value = false;
        let mut values = Vec::with_capacity(cells.len());
        for cell in &cells {
            let cell = cell.trim();
            if cell.is_empty() || cell == "." {
                values.push(f64::NAN);
                continue;
            }
            match cell.parse::<f64>() {
                Ok(v) => {
                    any_value = true;
                    values.push(v);
                }
                Err(_) => return Column::Text(cells),
            }
        }
        if any_value { Column::Float(values) } else { Column::Text(cells) }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Text(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Date(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Column::Text(_) => "text",
            Column::Float(_) => "float",
            Column::Date(_) => "date",
        }
    }

    /// Cell `i` rendered as text (used when re-parsing keys).
    pub fn cell_text(&self, i: usize) -> Option<String> {
        match self {
            Column::Text(v) => v.get(i).cloned(),
            Column::Float(v) => v.get(i).map(|x| format!("{x}")),
            Column::Date(v) => v.get(i).map(|d| d.to_string()),
        }
    }
}

/// A loaded source table: ordered, uniquely named columns of equal length.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Frame {
    pub fn new(columns: Vec<(String, Column)>) -> Result<Self, AppError> {
        let mut frame = Frame::default();
        for (name, column) in columns {
            frame.push(name, column)?;
        }
        Ok(frame)
    }

    fn push(&mut self, name: String, column: Column) -> Result<(), AppError> {
        if self.names.contains(&name) {
            return Err(AppError::usage(format!("Duplicate column `{name}` in frame.")));
        }
        if let Some(first) = self.columns.first() {
            if first.len() != column.len() {
                return Err(AppError::usage(format!(
                    "Column `{name}` has {} rows, expected {}.",
                    column.len(),
                    first.len()
                )));
            }
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, AppError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.columns[i])
            .ok_or_else(|| AppError::MissingColumn(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Keep the columns whose names are in `keep`, preserving frame order.
    pub fn select(&self, keep: &[String]) -> Frame {
        let (names, columns) = self
            .iter()
            .filter(|(name, _)| keep.iter().any(|k| k == name))
            .map(|(name, col)| (name.to_string(), col.clone()))
            .unzip();
        Frame { names, columns }
    }

    /// Return a copy with `name` replaced by (or appended as) `column`.
    pub fn with_column(&self, name: &str, column: Column) -> Result<Frame, AppError> {
        let mut out = self.clone();
        if let Some(i) = out.names.iter().position(|n| n == name) {
            if column.len() != out.n_rows() {
                return Err(AppError::usage(format!(
                    "Column `{name}` has {} rows, expected {}.",
                    column.len(),
                    out.n_rows()
                )));
            }
            out.columns[i] = column;
        } else {
            out.push(name.to_string(), column)?;
        }
        Ok(out)
    }

    /// Return a copy without the named columns (absent names are ignored).
    pub fn without(&self, drop: &[&str]) -> Frame {
        let (names, columns) = self
            .iter()
            .filter(|(name, _)| !drop.contains(name))
            .map(|(name, col)| (name.to_string(), col.clone()))
            .unzip();
        Frame { names, columns }
    }

    /// Return a copy with column `from` renamed to `to`.
    pub fn renamed(&self, from: &str, to: &str) -> Result<Frame, AppError> {
        if from == to {
            return Ok(self.clone());
        }
        if self.has_column(to) {
            return Err(AppError::usage(format!("Cannot rename `{from}`: `{to}` already exists.")));
        }
        let mut out = self.clone();
        let i = out
            .names
            .iter()
            .position(|n| n == from)
            .ok_or_else(|| AppError::MissingColumn(from.to_string()))?;
        out.names[i] = to.to_string();
        Ok(out)
    }
}

/// A named numeric series.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

impl Series {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// A column of ones, for callers that want an explicit intercept.
    pub fn constant(len: usize) -> Self {
        Self::new("const", vec![1.0; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return f64::NAN;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Ordered mapping from a short feature/outcome name to its series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedSeries {
    entries: Vec<Series>,
}

impl NamedSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) an entry. The series is renamed to `name`.
    pub fn insert(&mut self, name: impl Into<String>, series: Series) {
        let name = name.into();
        let series = series.renamed(name.clone());
        match self.entries.iter_mut().find(|s| s.name == name) {
            Some(slot) => *slot = series,
            None => self.entries.push(series),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Series> {
        self.entries.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Series> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Concatenate two dictionaries; entries of `other` win on name clashes.
    pub fn merged(&self, other: &NamedSeries) -> NamedSeries {
        let mut out = self.clone();
        for s in other.iter() {
            out.insert(s.name.clone(), s.clone());
        }
        out
    }
}

impl FromIterator<Series> for NamedSeries {
    fn from_iter<T: IntoIterator<Item = Series>>(iter: T) -> Self {
        let mut out = NamedSeries::new();
        for s in iter {
            out.insert(s.name.clone(), s);
        }
        out
    }
}

/// The merged, time-indexed table.
///
/// Invariants (checked by `Panel::new`): the index is strictly increasing,
/// column names are unique, and every column has one value per index entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    index: Vec<NaiveDate>,
    names: Vec<String>,
    data: Vec<Vec<f64>>,
}

impl Panel {
    pub fn new(index: Vec<NaiveDate>, columns: Vec<(String, Vec<f64>)>) -> Result<Self, AppError> {
        if index.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AppError::usage("Panel index must be unique and sorted ascending."));
        }
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            if !seen.insert(name.clone()) {
                return Err(AppError::usage(format!("Duplicate panel column `{name}`.")));
            }
            if values.len() != index.len() {
                return Err(AppError::usage(format!(
                    "Panel column `{name}` has {} values for {} index entries.",
                    values.len(),
                    index.len()
                )));
            }
            names.push(name);
            data.push(values);
        }
        Ok(Self { index, names, data })
    }

    pub fn index(&self) -> &[NaiveDate] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&[f64], AppError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.data[i].as_slice())
            .ok_or_else(|| AppError::MissingColumn(name.to_string()))
    }

    pub fn series(&self, name: &str) -> Result<Series, AppError> {
        Ok(Series::new(name, self.column(name)?.to_vec()))
    }

    /// Positional lookup of `date` in the index.
    pub fn position(&self, date: NaiveDate) -> Result<usize, AppError> {
        self.index
            .binary_search(&date)
            .map_err(|_| AppError::MissingDate(date))
    }

    /// Return a copy with `name` set to `values` (replacing an existing column).
    pub fn with_column(&self, name: &str, values: Vec<f64>) -> Result<Panel, AppError> {
        if values.len() != self.len() {
            return Err(AppError::usage(format!(
                "Column `{name}` has {} values for {} index entries.",
                values.len(),
                self.len()
            )));
        }
        let mut out = self.clone();
        match out.names.iter().position(|n| n == name) {
            Some(i) => out.data[i] = values,
            None => {
                out.names.push(name.to_string());
                out.data.push(values);
            }
        }
        Ok(out)
    }

    /// Apply `old -> new` renames. Unknown old names are ignored.
    pub fn renamed<'a>(
        &self,
        mapping: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Panel, AppError> {
        let mut names = self.names.clone();
        for (from, to) in mapping {
            if let Some(i) = names.iter().position(|n| n == from) {
                names[i] = to.to_string();
            }
        }
        Panel::new(self.index.clone(), names.into_iter().zip(self.data.clone()).collect())
    }

    /// Keep rows for which `keep(i)` is true.
    pub fn filter_rows(&self, keep: impl Fn(usize) -> bool) -> Panel {
        let rows: Vec<usize> = (0..self.len()).filter(|&i| keep(i)).collect();
        Panel {
            index: rows.iter().map(|&i| self.index[i]).collect(),
            names: self.names.clone(),
            data: self
                .data
                .iter()
                .map(|col| rows.iter().map(|&i| col[i]).collect())
                .collect(),
        }
    }

    /// Drop every row that has a `NaN` in any column.
    pub fn dropna(&self) -> Panel {
        self.filter_rows(|i| self.data.iter().all(|col| !col[i].is_nan()))
    }

    /// Rows with index at-or-before `end`.
    pub fn until(&self, end: NaiveDate) -> Panel {
        self.filter_rows(|i| self.index[i] <= end)
    }

    /// Rows with index at-or-after `start`.
    pub fn since(&self, start: NaiveDate) -> Panel {
        self.filter_rows(|i| self.index[i] >= start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn quarters(n: usize) -> Vec<NaiveDate> {
        (0..n)
            .map(|i| ymd(2000 + (i / 4) as i32, 3 * (i % 4) as u32 + 1, 1))
            .collect()
    }

    #[test]
    fn column_inference() {
        let c = Column::from_raw(vec!["1.5".into(), "".into(), "2".into()]);
        match c {
            Column::Float(v) => {
                assert_eq!(v[0], 1.5);
                assert!(v[1].is_nan());
            }
            other => panic!("expected float column, got {}", other.kind()),
        }
        let t = Column::from_raw(vec!["USA".into(), "1".into()]);
        assert_eq!(t.kind(), "text");
    }

    #[test]
    fn panel_rejects_unsorted_index() {
        let idx = vec![ymd(2000, 4, 1), ymd(2000, 1, 1)];
        assert!(Panel::new(idx, vec![]).is_err());
    }

    #[test]
    fn panel_rejects_duplicate_columns() {
        let cols = vec![("A".to_string(), vec![1.0]), ("A".to_string(), vec![2.0])];
        assert!(Panel::new(quarters(1), cols).is_err());
    }

    #[test]
    fn panel_missing_column_is_typed() {
        let panel = Panel::new(quarters(2), vec![("A".into(), vec![1.0, 2.0])]).unwrap();
        assert!(matches!(panel.column("B"), Err(AppError::MissingColumn(c)) if c == "B"));
    }

    #[test]
    fn with_column_does_not_touch_original() {
        let panel = Panel::new(quarters(2), vec![("A".into(), vec![1.0, 2.0])]).unwrap();
        let next = panel.with_column("B", vec![3.0, 4.0]).unwrap();
        assert!(!panel.has_column("B"));
        assert_eq!(next.column("B").unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn dropna_and_since() {
        let panel = Panel::new(
            quarters(4),
            vec![("A".into(), vec![f64::NAN, 2.0, 3.0, 4.0])],
        )
        .unwrap();
        assert_eq!(panel.dropna().len(), 3);
        let tail = panel.since(ymd(2000, 7, 1));
        assert_eq!(tail.index(), &[ymd(2000, 7, 1), ymd(2000, 10, 1)]);
        assert_eq!(panel.position(ymd(2000, 4, 1)).unwrap(), 1);
        assert!(matches!(panel.position(ymd(1999, 1, 1)), Err(AppError::MissingDate(_))));
    }

    #[test]
    fn named_series_insert_replaces() {
        let mut set = NamedSeries::new();
        set.insert("x", Series::new("raw", vec![1.0]));
        set.insert("x", Series::new("raw", vec![2.0]));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("x").unwrap().values, vec![2.0]);
        assert_eq!(set.get("x").unwrap().name, "x");
    }
}
