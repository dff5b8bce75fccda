//! Date parsing for the time key shared by every source.
//!
//! Sources disagree on how they spell a quarter: FRED uses `1947-01-01`,
//! OECD exports `1960-Q1`, the CBO archive splits it into `Year` + `Quarter`.
//! Everything is normalized to the first day of the period.

use chrono::NaiveDate;

const DATE_FMTS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parse a date-like cell. Returns `None` when no known format matches.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // Timestamps such as `2022-01-01 00:00:00` or `2022-01-01T00:00:00`.
    if let Some(prefix) = s.get(..10) {
        if s.len() > 10 && matches!(s.as_bytes()[10], b' ' | b'T') {
            if let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
                return Some(d);
            }
        }
    }

    parse_quarter(s)
}

/// Parse `YYYY-Qn`, `YYYYQn` or `YYYY Qn`.
fn parse_quarter(s: &str) -> Option<NaiveDate> {
    let upper = s.to_ascii_uppercase();
    let (year, quarter) = upper.split_once('Q')?;
    let year = year.trim_end_matches(['-', ' ']).parse::<i32>().ok()?;
    let quarter = quarter.trim().parse::<u32>().ok()?;
    quarter_start(year, quarter)
}

/// First day of quarter `q` (1..=4) of `year`.
pub fn quarter_start(year: i32, q: u32) -> Option<NaiveDate> {
    if !(1..=4).contains(&q) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, 3 * (q - 1) + 1, 1)
}
