// Utility helpers for parsing and basic statistics.
//
// This module centralizes all the "dirty" CSV/number/date handling so the
// rest of the code can assume clean, typed values.
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use num_format::{Locale, ToFormattedString};
use std::collections::HashMap;
use std::hash::Hash;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports (commas, spaces, text).
///
/// - Accepts `Option<&str>` so callers can pass through optional fields.
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
    let s = s.replace(",", "");
    s.parse::<f64>().ok()
}

/// Parse a timestamp in `YYYY-MM-DD HH:MM:SS` form, falling back to a bare
/// `YYYY-MM-DD` date at midnight. Returns `None` for anything else.
pub fn parse_datetime_safe(s: Option<&str>) -> Option<NaiveDateTime> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Whole-day difference between two timestamps, computed on the date
/// component so the time of day never shifts the result.
pub fn days_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to.date() - from.date()).num_days()
}

pub fn average(v: &[f64]) -> f64 {
    // Standard arithmetic mean; returns 0 for an empty slice to avoid NaNs.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

/// Most frequent value in `values`. Ties are broken in favor of the value
/// that appears first in the input, so the result is stable for a given
/// row order.
pub fn mode_first<T>(values: &[T]) -> Option<T>
where
    T: Eq + Hash + Clone,
{
    let mut counts: HashMap<&T, (usize, usize)> = HashMap::new();
    for (idx, v) in values.iter().enumerate() {
        let entry = counts.entry(v).or_insert((0, idx));
        entry.0 += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| (a.1 .0).cmp(&b.1 .0).then((b.1 .1).cmp(&a.1 .1)))
        .map(|(v, _)| v.clone())
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Format a floating-point value with:
    // - a fixed number of decimal places, and
    // - locale-aware thousands separators (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative();
    let abs_n = n.abs();
    // First, format to a plain fixed-decimal string like `1234567.89`.
    let s = format!("{:.*}", decimals, abs_n);
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    // Use `num-format` to insert commas into the integer portion.
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    } else if decimals > 0 {
        res.push('.');
        res.push_str(&"0".repeat(decimals));
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for integer-like values. This is used
    // for counts in console messages (e.g., `99,441 rows loaded`).
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_f64_rejects_text_and_strips_commas() {
        assert_eq!(parse_f64_safe(Some("1,234.5")), Some(1234.5));
        assert_eq!(parse_f64_safe(Some("  42 ")), Some(42.0));
        assert_eq!(parse_f64_safe(Some("n/a")), None);
        assert_eq!(parse_f64_safe(Some("")), None);
        assert_eq!(parse_f64_safe(None), None);
    }

    #[test]
    fn parse_datetime_accepts_both_forms() {
        let full = parse_datetime_safe(Some("2017-10-02 10:56:33")).unwrap();
        assert_eq!(full.date(), NaiveDate::from_ymd_opt(2017, 10, 2).unwrap());
        let bare = parse_datetime_safe(Some("2017-10-02")).unwrap();
        assert_eq!(bare.time(), NaiveTime::MIN);
        assert_eq!(parse_datetime_safe(Some("02/10/2017")), None);
        assert_eq!(parse_datetime_safe(Some("")), None);
    }

    #[test]
    fn days_between_ignores_time_of_day() {
        let est = parse_datetime_safe(Some("2024-01-10 00:00:00")).unwrap();
        let late_same_day = parse_datetime_safe(Some("2024-01-10 23:59:59")).unwrap();
        assert_eq!(days_between(est, late_same_day), 0);
        let early = parse_datetime_safe(Some("2024-01-08 16:00:00")).unwrap();
        assert_eq!(days_between(est, early), -2);
    }

    #[test]
    fn mode_prefers_first_encountered_on_ties() {
        let vals: Vec<String> = ["boleto", "credit_card", "credit_card", "boleto"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(mode_first(&vals), Some("boleto".to_string()));

        let vals: Vec<String> = ["voucher", "credit_card", "credit_card"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(mode_first(&vals), Some("credit_card".to_string()));

        let empty: Vec<String> = Vec::new();
        assert_eq!(mode_first(&empty), None);
    }

    #[test]
    fn average_of_empty_is_zero() {
        assert_eq!(average(&[]), 0.0);
        assert_eq!(average(&[2.0, 4.0]), 3.0);
    }
}
