//! Synthetic quarterly panel with the column layout of the cleaned NKPC data.
//!
//! Used by the `simulate` command for smoke runs and by tests that need a
//! realistic panel without the raw sources. The generated economy:
//!
//! ```text
//! NAIRU_t        slow bounded random walk around 5.5
//! Unemployment_t NAIRU_t + gap_t,  gap_t = 0.85 gap_{t-1} + e
//! Inflation_t    1.0 + 0.6 * mean(Inflation_{t-1..t-4}) - 0.4 * gap_t + e
//! MSC_t          0.3 * 3.0 + 0.7 * Inflation_{t-1} + e
//! ```
//!
//! `CPI` is the price index implied by `Inflation`; `GDP` and `Labor_share`
//! are in logs, as after cleaning.

use chrono::{Months, NaiveDate};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::transform::{backward_expectations, detrend};
use crate::domain::Panel;
use crate::error::AppError;

/// Default number of simulated quarters (1960Q1 to 2022Q4).
pub const DEFAULT_QUARTERS: usize = 252;

#[derive(Debug, Clone)]
pub struct SampleConfig {
    pub quarters: usize,
    pub seed: u64,
    pub start: NaiveDate,
    /// Expectations coefficient in the inflation equation.
    pub expectations_slope: f64,
    /// Slope on the unemployment gap.
    pub gap_slope: f64,
    /// Standard deviation of the inflation shock.
    pub shock_sd: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            quarters: DEFAULT_QUARTERS,
            seed: 42,
            start: NaiveDate::from_ymd_opt(1960, 1, 1).unwrap_or_default(),
            expectations_slope: 0.6,
            gap_slope: -0.4,
            shock_sd: 0.5,
        }
    }
}

/// Generate a clean panel.
pub fn generate_panel(cfg: &SampleConfig) -> Result<Panel, AppError> {
    if cfg.quarters < 8 {
        return Err(AppError::usage("Need at least 8 quarters to simulate a panel."));
    }

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let unit = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::numerical(format!("Noise distribution error: {e}")))?;
    let mut draw = |sd: f64| sd * unit.sample(&mut rng);

    let n = cfg.quarters;
    let mut index = Vec::with_capacity(n);
    let mut nairu = Vec::with_capacity(n);
    let mut unemployment = Vec::with_capacity(n);
    let mut inflation: Vec<f64> = Vec::with_capacity(n);
    let mut msc = Vec::with_capacity(n);
    let mut cpi = Vec::with_capacity(n);
    let mut gdp = Vec::with_capacity(n);
    let mut labor_share = Vec::with_capacity(n);

    let (mut level, mut gap, mut log_gdp, mut log_ls, mut price) = (5.5, 0.0, 8.0, 4.6, 100.0);
    for t in 0..n {
        let date = cfg
            .start
            .checked_add_months(Months::new(3 * t as u32))
            .ok_or_else(|| AppError::usage("Simulated calendar ran past the supported date range."))?;
        index.push(date);

        level = (level + draw(0.05)).clamp(4.0, 7.0);
        gap = 0.85 * gap + draw(0.4);
        nairu.push(level);
        unemployment.push(level + gap);

        let recent = &inflation[t.saturating_sub(4)..t];
        let expected = if recent.is_empty() {
            2.5
        } else {
            recent.iter().sum::<f64>() / recent.len() as f64
        };
        let pi = 1.0 + cfg.expectations_slope * expected + cfg.gap_slope * gap + draw(cfg.shock_sd);

        let previous = inflation.last().copied().unwrap_or(2.5);
        msc.push(0.3 * 3.0 + 0.7 * previous + draw(0.3));
        inflation.push(pi);

        price *= 1.0 + pi / 100.0;
        cpi.push(price);

        log_gdp += 0.008 - 0.002 * gap + draw(0.006);
        gdp.push(log_gdp);
        log_ls = 0.95 * log_ls + 0.05 * 4.6 + draw(0.004);
        labor_share.push(log_ls);
    }

    let panel = Panel::new(
        index,
        vec![
            ("CPI".into(), cpi),
            ("GDP".into(), gdp),
            ("Labor_share".into(), labor_share),
            ("MSC".into(), msc),
            ("NAIRU".into(), nairu),
            ("Unemployment".into(), unemployment),
            ("Inflation".into(), inflation),
        ],
    )?;
    let panel = detrend(&panel, "GDP", 1, None)?;
    backward_expectations(&panel, "Inflation", 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_has_the_clean_layout() {
        let panel = generate_panel(&SampleConfig::default()).unwrap();
        assert_eq!(panel.len(), DEFAULT_QUARTERS);
        for col in [
            "Inflation",
            "Unemployment",
            "NAIRU",
            "MSC",
            "Labor_share",
            "GDP_detrended",
            "Backward_Expectations_Inflation",
        ] {
            assert!(panel.has_column(col), "missing {col}");
        }
        assert_eq!(panel.index()[0], NaiveDate::from_ymd_opt(1960, 1, 1).unwrap());
        assert_eq!(panel.index()[251], NaiveDate::from_ymd_opt(2022, 10, 1).unwrap());
    }

    #[test]
    fn same_seed_same_panel() {
        let cfg = SampleConfig {
            quarters: 40,
            ..SampleConfig::default()
        };
        assert_eq!(generate_panel(&cfg).unwrap(), generate_panel(&cfg).unwrap());

        let other = SampleConfig { seed: 7, ..cfg.clone() };
        assert_ne!(generate_panel(&cfg).unwrap(), generate_panel(&other).unwrap());
    }

    #[test]
    fn too_short() {
        let cfg = SampleConfig {
            quarters: 3,
            ..SampleConfig::default()
        };
        assert!(matches!(generate_panel(&cfg), Err(AppError::Usage(_))));
    }
}
