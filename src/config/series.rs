//! Regression inputs defined in terms of panel columns.

use serde::{Deserialize, Serialize};

use crate::domain::{NamedSeries, Panel, Series};
use crate::error::AppError;

/// How a series is derived from the panel.
///
/// In YAML a plain string is a column, a two-element list is a difference:
/// `series: Unemployment` or `series: [Unemployment, NAIRU]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SeriesDef {
    Column(String),
    /// `a - b`
    Difference(String, String),
}

impl SeriesDef {
    pub fn evaluate(&self, panel: &Panel) -> Result<Series, AppError> {
        match self {
            SeriesDef::Column(name) => panel.series(name),
            SeriesDef::Difference(a, b) => {
                let lhs = panel.column(a)?;
                let rhs = panel.column(b)?;
                let values = lhs.iter().zip(rhs).map(|(x, y)| x - y).collect();
                Ok(Series::new(format!("{a}-{b}"), values))
            }
        }
    }

    /// Panel columns this definition reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            SeriesDef::Column(name) => vec![name.as_str()],
            SeriesDef::Difference(a, b) => vec![a.as_str(), b.as_str()],
        }
    }
}

/// A short regression name bound to its derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDef {
    pub name: String,
    pub series: SeriesDef,
}

impl FeatureDef {
    pub fn column(name: &str, column: &str) -> Self {
        Self {
            name: name.to_string(),
            series: SeriesDef::Column(column.to_string()),
        }
    }

    pub fn difference(name: &str, a: &str, b: &str) -> Self {
        Self {
            name: name.to_string(),
            series: SeriesDef::Difference(a.to_string(), b.to_string()),
        }
    }

    pub fn evaluate(&self, panel: &Panel) -> Result<Series, AppError> {
        Ok(self.series.evaluate(panel)?.renamed(self.name.clone()))
    }
}

/// Evaluate every definition against `panel`, preserving order.
pub fn named_series(defs: &[FeatureDef], panel: &Panel) -> Result<NamedSeries, AppError> {
    defs.iter().map(|d| d.evaluate(panel)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn panel() -> Panel {
        let index = (1..=3)
            .map(|q| NaiveDate::from_ymd_opt(2000, 3 * q - 2, 1).unwrap())
            .collect();
        Panel::new(
            index,
            vec![
                ("Unemployment".into(), vec![5.0, 6.0, 7.0]),
                ("NAIRU".into(), vec![4.5, 4.5, 5.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn difference_subtracts_columns() {
        let def = FeatureDef::difference("Unemp_Gap", "Unemployment", "NAIRU");
        let s = def.evaluate(&panel()).unwrap();
        assert_eq!(s.name, "Unemp_Gap");
        assert_eq!(s.values, vec![0.5, 1.5, 2.0]);
    }

    #[test]
    fn named_series_keeps_order_and_names() {
        let defs = vec![
            FeatureDef::column("Unemp", "Unemployment"),
            FeatureDef::difference("Gap", "Unemployment", "NAIRU"),
        ];
        let named = named_series(&defs, &panel()).unwrap();
        assert_eq!(named.names(), vec!["Unemp", "Gap"]);
    }

    #[test]
    fn unknown_column_is_reported() {
        let def = FeatureDef::column("MSC", "MSC");
        assert!(matches!(def.evaluate(&panel()), Err(AppError::MissingColumn(c)) if c == "MSC"));
    }
}
