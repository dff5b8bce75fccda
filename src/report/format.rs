//! Formatted model output: terminal summaries and LaTeX tables.
//!
//! We keep formatting code in one place so:
//! - the fitting code stays free of presentation concerns
//! - output changes are localized

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::NaiveDate;

use crate::error::AppError;
use crate::fit::FittedModel;

/// Significance stars: `*` p<0.1, `**` p<0.05, `***` p<0.01.
pub fn stars(p: f64) -> &'static str {
    if p < 0.01 {
        "***"
    } else if p < 0.05 {
        "**"
    } else if p < 0.1 {
        "*"
    } else {
        ""
    }
}

/// Plain-text regression summary.
pub fn format_summary(model: &FittedModel) -> Result<String, AppError> {
    let pvalues = model.pvalues()?;
    let ci = model.conf_int(0.05)?;
    let tvalues = model.tvalues();
    let stat = if model.cov_type.is_robust() { "z" } else { "t" };

    let mut out = String::new();
    out.push_str(&format!("=== {} regression of {} ===\n", model.method, model.outcome));
    out.push_str(&format!(
        "Observations: {} | df resid: {} | R²: {:.4} | adj. R²: {:.4}\n",
        model.nobs, model.df_resid, model.rsquared, model.rsquared_adj
    ));
    out.push_str(&format!("Covariance: {}\n", model.cov_type.label()));
    let d = &model.diagnostics;
    out.push_str(&format!(
        "Breusch-Godfrey({}): LM={:.4} p={:.4} | Breusch-Pagan({}): LM={:.4} p={:.4}\n\n",
        d.breusch_godfrey.df,
        d.breusch_godfrey.statistic,
        d.breusch_godfrey.pvalue,
        d.breusch_pagan.df,
        d.breusch_pagan.statistic,
        d.breusch_pagan.pvalue,
    ));

    out.push_str(
        format!(
            "{:<24} {:>10} {:>10} {:>8} {:>8} {:>10} {:>10}",
            "", "coef", "std err", stat, format!("P>|{stat}|"), "[0.025", "0.975]"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(&format!("{:-<24} {:-<10} {:-<10} {:-<8} {:-<8} {:-<10} {:-<10}\n", "", "", "", "", "", "", ""));
    for (j, name) in model.exog_names.iter().enumerate() {
        out.push_str(&format!(
            "{:<24} {:>10.4} {:>10.4} {:>8.3} {:>8.3} {:>10.4} {:>10.4}\n",
            truncate(name, 24),
            model.params[j],
            model.bse[j],
            tvalues[j],
            pvalues[j],
            ci[j].0,
            ci[j].1
        ));
    }
    Ok(out)
}

/// LaTeX coefficient table (2 decimals, significance stars on coefficients).
pub fn to_latex(model: &FittedModel, caption: Option<&str>) -> Result<String, AppError> {
    let pvalues = model.pvalues()?;
    let tvalues = model.tvalues();
    let stat = if model.cov_type.is_robust() { "z" } else { "t" };

    let mut out = String::new();
    let _ = writeln!(out, "\\begin{{table}}[!htbp]\\centering");
    if let Some(caption) = caption {
        let _ = writeln!(out, "\\caption{{{}}}", escape_latex(caption));
    }
    let _ = writeln!(out, "\\begin{{tabular}}{{lcccc}}\n\\hline");
    let _ = writeln!(
        out,
        " & coef & std err & ${stat}$ & $P>|{stat}|$ \\\\\n\\hline\n\\multicolumn{{5}}{{l}}{{Dep. variable: {}}} \\\\\n\\hline",
        escape_latex(&model.outcome)
    );
    for (j, name) in model.exog_names.iter().enumerate() {
        let _ = writeln!(
            out,
            "{} & {:.2}{} & {:.2} & {:.2} & {:.2} \\\\",
            escape_latex(name),
            model.params[j],
            stars(pvalues[j]),
            model.bse[j],
            tvalues[j],
            pvalues[j]
        );
    }
    let _ = writeln!(out, "\\hline");
    let _ = writeln!(out, "Observations & \\multicolumn{{4}}{{c}}{{{}}} \\\\", model.nobs);
    let _ = writeln!(out, "$R^2$ & \\multicolumn{{4}}{{c}}{{{:.2}}} \\\\", model.rsquared);
    let _ = writeln!(out, "Adj. $R^2$ & \\multicolumn{{4}}{{c}}{{{:.2}}} \\\\", model.rsquared_adj);
    let _ = writeln!(
        out,
        "Covariance & \\multicolumn{{4}}{{c}}{{{}}} \\\\",
        escape_latex(&model.cov_type.label())
    );
    let _ = writeln!(out, "\\hline");
    let _ = writeln!(out, "\\multicolumn{{5}}{{l}}{{\\footnotesize * p<0.1, ** p<0.05, *** p<0.01}} \\\\");
    let _ = writeln!(out, "\\end{{tabular}}\n\\end{{table}}");
    Ok(out)
}

/// One line per fitted unit.
pub fn format_estimation_table(rows: &[(String, &FittedModel)]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<44} {:>6} {:>8} {:>18} {:>8} {:>8}",
            "model", "n", "R²", "covariance", "BG p", "BP p"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(&format!("{:-<44} {:-<6} {:-<8} {:-<18} {:-<8} {:-<8}\n", "", "", "", "", "", ""));
    for (stem, model) in rows {
        out.push_str(&format!(
            "{:<44} {:>6} {:>8.3} {:>18} {:>8.4} {:>8.4}\n",
            truncate(stem, 44),
            model.nobs,
            model.rsquared,
            model.cov_type.label(),
            model.diagnostics.breusch_godfrey.pvalue,
            model.diagnostics.breusch_pagan.pvalue,
        ));
    }
    out
}

/// Chow p-values, one row per feature and one column per date.
pub fn format_breakpoint_table(table: &BTreeMap<String, BTreeMap<NaiveDate, f64>>) -> String {
    let dates: Vec<NaiveDate> = table
        .values()
        .flat_map(|row| row.keys().copied())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut out = format!("{:<16}", "feature");
    for d in &dates {
        out.push_str(&format!(" {:>12}", d.to_string()));
    }
    out.push('\n');
    for (name, row) in table {
        out.push_str(&format!("{:<16}", truncate(name, 16)));
        for d in &dates {
            match row.get(d) {
                Some(p) => out.push_str(&format!(" {:>9.4}{:<3}", p, stars(*p))),
                None => out.push_str(&format!(" {:>12}", "-")),
            }
        }
        out.push('\n');
    }
    out
}

fn escape_latex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '_' | '%' | '&' | '#' | '$' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Series;
    use crate::fit::{FitOptions, fit};

    fn model() -> FittedModel {
        let n = 80;
        let x: Vec<f64> = (0..n).map(|i| (i as f64 * 0.21).sin()).collect();
        let y: Vec<f64> = (0..n)
            .map(|i| 1.0 + 2.5 * x[i] + ((i * 37) % 11) as f64 * 0.0002)
            .collect();
        fit(
            &Series::new("Inflation", y),
            &[Series::new("Unemp_Gap", x)],
            "OLS",
            &FitOptions {
                add_constant: true,
                ..FitOptions::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn stars_thresholds() {
        assert_eq!(stars(0.009), "***");
        assert_eq!(stars(0.01), "**");
        assert_eq!(stars(0.049), "**");
        assert_eq!(stars(0.05), "*");
        assert_eq!(stars(0.099), "*");
        assert_eq!(stars(0.1), "");
    }

    #[test]
    fn latex_table_has_rows_and_stars() {
        let m = model();
        let tex = to_latex(&m, Some("Unemp_Gap_BackExp_OLS")).unwrap();
        assert!(tex.starts_with("\\begin{table}"));
        assert!(tex.contains("\\caption{Unemp\\_Gap\\_BackExp\\_OLS}"));
        assert!(tex.contains("Unemp\\_Gap & 2.5"));
        assert!(tex.contains("***"));
        assert!(tex.contains("Observations & \\multicolumn{4}{c}{80}"));
        assert!(tex.trim_end().ends_with("\\end{table}"));
    }

    #[test]
    fn latex_table_layout_is_one_row_per_line() {
        let m = model();
        let tex = to_latex(&m, None).unwrap();
        let lines: Vec<&str> = tex.lines().collect();
        assert_eq!(lines.len(), 18);
        assert!(lines.iter().all(|l| !l.is_empty()));
        assert_eq!(lines[0], "\\begin{table}[!htbp]\\centering");
        assert_eq!(lines[1], "\\begin{tabular}{lcccc}");
        assert!(lines[7].starts_with("const & 1.00"));
        assert!(lines[8].starts_with("Unemp\\_Gap & 2.50"));
        assert_eq!(lines[17], "\\end{table}");
        assert!(tex.ends_with("\\end{table}\n"));
        assert!(!tex.contains("\\caption"));
    }

    #[test]
    fn summary_lists_every_regressor() {
        let m = model();
        let text = format_summary(&m).unwrap();
        assert!(text.contains("regression of Inflation"));
        assert!(text.lines().any(|l| l.starts_with("const ")));
        assert!(text.lines().any(|l| l.starts_with("Unemp_Gap ")));
    }

    #[test]
    fn breakpoint_table_marks_missing_cells() {
        let d1 = NaiveDate::from_ymd_opt(1984, 10, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2007, 7, 1).unwrap();
        let table = BTreeMap::from([
            ("MSC".to_string(), BTreeMap::from([(d1, 0.2), (d2, 0.001)])),
            ("Unemp".to_string(), BTreeMap::from([(d1, 0.04)])),
        ]);
        let text = format_breakpoint_table(&table);
        assert!(text.contains("2007-07-01"));
        assert!(text.lines().nth(1).unwrap().contains("***"));
        assert!(text.lines().nth(2).unwrap().trim_end().ends_with('-'));
    }
}
