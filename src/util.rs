// Utility helpers for parsing and basic number handling.
//
// This module centralizes the "dirty" CSV/number/date handling so the rest of
// the code can assume clean, typed values.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in exported aggregates.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i32>().ok()
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    // Dates are expected in `YYYY-MM-DD` format; a trailing time part is ignored.
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let day = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Round half up (`2.5 -> 3`, `-2.5 -> -2`).
///
/// Used for every percentage and average so that the same input always lands
/// on the same integer regardless of sign.
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Counts in console messages (e.g., `9,855 rows loaded`).
    n.to_formatted_string(&Locale::en)
}

/// Signed integer display used for deltas: `+2`, `0`, `-3`.
pub fn format_signed(n: i64) -> String {
    if n > 0 {
        format!("+{}", format_int(n))
    } else {
        format_int(n)
    }
}
