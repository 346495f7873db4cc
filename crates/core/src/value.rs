//! Scalar coercions shared by inference, filtering and segmentation.
//!
//! Row values arrive as loosely typed JSON scalars. Two numeric readings exist:
//! [`parse_float`] takes the longest numeric prefix of a string and is used for
//! profiling and statistics, while [`to_number`] requires the whole string to be
//! numeric and is used where a comparison must not succeed by accident.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// String form used for equality and membership tests.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                n.as_f64().map(format_float).unwrap_or_default()
            }
        }
        other => other.to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f == 0.0 {
        "0".to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e21 {
        format!("{f:.0}")
    } else {
        f.to_string()
    }
}

/// Lenient numeric reading: longest leading float literal, NaN when none.
pub fn parse_float(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_float_prefix(s),
        _ => f64::NAN,
    }
}

/// Strict numeric reading: the trimmed string must be a finite number.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => parse_strict(s),
        _ => f64::NAN,
    }
}

/// Strict parse of a raw string, NaN on failure.
pub fn parse_strict(s: &str) -> f64 {
    match s.trim().parse::<f64>() {
        Ok(f) if f.is_finite() => f,
        _ => f64::NAN,
    }
}

/// Parse the longest prefix of `s` (after leading whitespace) that forms a
/// decimal literal with optional sign and exponent.
pub fn parse_float_prefix(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    if trimmed[end..].starts_with("Infinity") {
        let sign = if bytes.first() == Some(&b'-') { -1.0 } else { 1.0 };
        return sign * f64::INFINITY;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return f64::NAN;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    trimmed[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/// Finite numeric value under the lenient reading, if any.
pub fn finite_float(value: &Value) -> Option<f64> {
    let f = parse_float(value);
    f.is_finite().then_some(f)
}

/// Parse a calendar date in one of the accepted layouts.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Date reading of a row value; only strings carry dates.
pub fn value_date(value: &Value) -> Option<NaiveDate> {
    value.as_str().and_then(parse_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_string() {
        assert_eq!(display_string(&json!("abc")), "abc");
        assert_eq!(display_string(&json!(5)), "5");
        assert_eq!(display_string(&json!(5.0)), "5");
        assert_eq!(display_string(&json!(5.25)), "5.25");
        assert_eq!(display_string(&json!(true)), "true");
        assert_eq!(display_string(&Value::Null), "");
    }

    #[test]
    fn test_parse_float_prefix() {
        assert_eq!(parse_float(&json!("12abc")), 12.0);
        assert_eq!(parse_float(&json!("  -3.5e2x")), -350.0);
        assert_eq!(parse_float(&json!(".5")), 0.5);
        assert_eq!(parse_float(&json!("7.")), 7.0);
        assert_eq!(parse_float(&json!("1e")), 1.0);
        assert_eq!(parse_float(&json!("2024-01-05")), 2024.0);
        assert!(parse_float(&json!("abc")).is_nan());
        assert!(parse_float(&json!("")).is_nan());
        assert!(parse_float(&json!(".")).is_nan());
        assert!(parse_float(&json!(true)).is_nan());
        assert!(parse_float(&Value::Null).is_nan());
    }

    #[test]
    fn test_to_number_is_strict() {
        assert_eq!(to_number(&json!(" 42 ")), 42.0);
        assert_eq!(to_number(&json!(1.5)), 1.5);
        assert!(to_number(&json!("12abc")).is_nan());
        assert!(to_number(&json!("")).is_nan());
        assert!(to_number(&json!("inf")).is_nan());
        assert!(to_number(&Value::Null).is_nan());
    }

    #[test]
    fn test_parse_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(parse_date("2024-03-09"), Some(expected));
        assert_eq!(parse_date("03/09/2024"), Some(expected));
        assert_eq!(parse_date("03-09-2024"), Some(expected));
        assert_eq!(parse_date("2024-03-09T10:00:00Z"), Some(expected));
        assert_eq!(parse_date("2024-03-09 23:59:59"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
        assert_eq!(value_date(&json!(20240309)), None);
    }
}
