//! Regression figures rendered with Plotters' SVG backend.
//!
//! One figure per `(feature_1, feature_2, method)`: the observed
//! `(feature_1, outcome)` scatter plus the fitted line with `feature_2` held
//! at its sample mean.

use std::error::Error;
use std::path::Path;

use plotters::prelude::*;

use crate::domain::Series;
use crate::error::AppError;
use crate::fit::FittedModel;
use crate::io::ensure_parent;

/// Points on the fitted line.
const LINE_POINTS: usize = 20;

/// Render-ready description of one regression figure.
#[derive(Debug, Clone)]
pub struct RegressionFigure {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Observed `(feature_1, outcome)` pairs.
    pub points: Vec<(f64, f64)>,
    /// Fitted line over the observed `feature_1` range.
    pub line: Vec<(f64, f64)>,
}

impl RegressionFigure {
    /// Build the figure for a two-feature model.
    ///
    /// `feature_1` and `feature_2` must be the model's regressors, in order.
    /// The fitted plane is shown as a 2D projection: the line is the model's
    /// prediction along `feature_1` with `feature_2` fixed at its sample mean,
    /// so points are not adjusted for their own `feature_2` value.
    pub fn from_model(
        model: &FittedModel,
        outcome: &Series,
        feature_1: &Series,
        feature_2: &Series,
        title: &str,
    ) -> Result<Self, AppError> {
        if feature_1.len() != outcome.len() || feature_2.len() != outcome.len() {
            return Err(AppError::usage("Figure series must have equal lengths."));
        }
        let (lo, hi) = finite_range(&feature_1.values)
            .ok_or_else(|| AppError::usage(format!("Feature `{}` has no finite values.", feature_1.name)))?;
        let held = feature_2.mean();

        let line = (0..LINE_POINTS)
            .map(|i| {
                let x = lo + (hi - lo) * i as f64 / (LINE_POINTS - 1) as f64;
                Ok((x, model.predict(&[x, held])?))
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(Self {
            title: title.to_string(),
            x_label: axis_title(&feature_1.name),
            y_label: axis_title(&outcome.name),
            points: feature_1.values.iter().copied().zip(outcome.values.iter().copied()).collect(),
            line,
        })
    }
}

/// Human-readable axis titles for the study's series.
pub fn axis_title(name: &str) -> String {
    match name {
        "Unemp" | "Unemployment" => "Unemployment Rate (in %)".to_string(),
        "Unemp_Gap" => "Unemployment Gap (in %)".to_string(),
        "Labor_share" => "NFB Labor Income Share (log)".to_string(),
        "Inflation" => "Inflation (in %)".to_string(),
        "BackExp" | "Backward_Expectations_Inflation" => "Backward-looking Expected Inflation (in %)".to_string(),
        "MSC" => "Michigan Survey Expected Inflation (in %)".to_string(),
        other => other.to_string(),
    }
}

/// Write the figure as SVG.
pub fn write_regression_svg(path: &Path, figure: &RegressionFigure, size: (u32, u32)) -> Result<(), AppError> {
    ensure_parent(path)?;
    draw(path, figure, size).map_err(|e| {
        AppError::io(
            format!("Failed to render figure '{}'", path.display()),
            std::io::Error::other(e.to_string()),
        )
    })
}

fn draw(path: &Path, figure: &RegressionFigure, size: (u32, u32)) -> Result<(), Box<dyn Error>> {
    let xs = figure.points.iter().chain(&figure.line).map(|p| p.0);
    let ys = figure.points.iter().chain(&figure.line).map(|p| p.1);
    let (x0, x1) = padded(xs.collect::<Vec<_>>().as_slice());
    let (y0, y1) = padded(ys.collect::<Vec<_>>().as_slice());

    let root = SVGBackend::new(path, size).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&figure.title, ("sans-serif", 18))
        .margin(12)
        .set_label_area_size(LabelAreaPosition::Left, 56)
        .set_label_area_size(LabelAreaPosition::Bottom, 44)
        .build_cartesian_2d(x0..x1, y0..y1)?;

    chart
        .configure_mesh()
        .x_desc(figure.x_label.as_str())
        .y_desc(figure.y_label.as_str())
        .x_labels(8)
        .y_labels(8)
        .x_label_formatter(&|v| format!("{v:.1}"))
        .y_label_formatter(&|v| format!("{v:.1}"))
        .draw()?;

    let points_color = RGBColor(31, 119, 180);
    let line_color = RGBColor(214, 39, 40);

    chart.draw_series(
        figure
            .points
            .iter()
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|&(x, y)| Circle::new((x, y), 3, points_color.filled())),
    )?;
    chart.draw_series(LineSeries::new(figure.line.iter().copied(), line_color.stroke_width(2)))?;

    root.present()?;
    Ok(())
}

fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Axis range with 5% padding (and a unit span for degenerate data).
fn padded(values: &[f64]) -> (f64, f64) {
    match finite_range(values) {
        None => (0.0, 1.0),
        Some((lo, hi)) if hi - lo <= f64::EPSILON => (lo - 0.5, hi + 0.5),
        Some((lo, hi)) => {
            let pad = (hi - lo) * 0.05;
            (lo - pad, hi + pad)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitOptions, fit};

    #[test]
    fn figure_line_spans_feature_range() {
        let n = 40;
        let f1 = Series::new("Unemp", (0..n).map(|i| 3.0 + 0.1 * i as f64).collect());
        let f2 = Series::new("MSC", (0..n).map(|i| (i as f64 * 0.4).sin()).collect());
        let y = Series::new(
            "Inflation",
            (0..n).map(|i| 5.0 - 0.5 * f1.values[i] + f2.values[i]).collect(),
        );
        let model = fit(&y, &[f1.clone(), f2.clone()], "OLS", &FitOptions::default()).unwrap();

        let fig = RegressionFigure::from_model(&model, &y, &f1, &f2, "Unemp_MSC_OLS").unwrap();
        assert_eq!(fig.line.len(), LINE_POINTS);
        assert!((fig.line[0].0 - 3.0).abs() < 1e-12);
        assert!((fig.line[LINE_POINTS - 1].0 - 6.9).abs() < 1e-9);
        assert_eq!(fig.x_label, "Unemployment Rate (in %)");
        assert_eq!(fig.points.len(), n);

        let held = f2.mean();
        for &(x, y) in &fig.line {
            assert_eq!(y, model.predict(&[x, held]).unwrap());
        }
    }

    #[test]
    fn writes_svg_file() {
        let fig = RegressionFigure {
            title: "demo".into(),
            x_label: "x".into(),
            y_label: "y".into(),
            points: vec![(0.0, 1.0), (1.0, 2.0), (2.0, 2.5)],
            line: vec![(0.0, 1.1), (2.0, 2.6)],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("figures").join("demo.svg");
        write_regression_svg(&path, &fig, (640, 480)).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("<svg"));
    }

    #[test]
    fn padding_handles_flat_data() {
        assert_eq!(padded(&[2.0, 2.0]), (1.5, 2.5));
        assert_eq!(padded(&[] as &[f64]), (0.0, 1.0));
    }
}
