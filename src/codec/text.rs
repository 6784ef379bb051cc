//! Stored-text encoding and decoding

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::value::CellValue;

/// Fixed textual date format used for stored dates (always UTC).
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Marker that makes `parse` attempt a date conversion
const DATE_MARKER: &str = "GMT";

/// Converts a value into its canonical stored text.
pub fn stringify(value: &CellValue) -> String {
    match value {
        CellValue::Null => String::new(),
        CellValue::Bool(b) => b.to_string(),
        CellValue::Number(n) => format_number(*n),
        CellValue::Date(d) => d.format(DATE_FORMAT).to_string(),
        CellValue::Text(s) => s.clone(),
        CellValue::Json(v) => canonicalize(v).to_string(),
    }
}

/// Parses stored text into a typed value, trying each kind in priority order.
pub fn parse(text: &str) -> CellValue {
    if text.is_empty() {
        return CellValue::Null;
    }

    if text.eq_ignore_ascii_case("true") {
        return CellValue::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return CellValue::Bool(false);
    }

    if let Some(n) = parse_number(text) {
        return CellValue::Number(n);
    }

    if text.contains(DATE_MARKER) {
        if let Some(date) = parse_stored_date(text) {
            return CellValue::Date(date);
        }
    }

    if is_bracketed(text) {
        if let Ok(json) = serde_json::from_str::<Value>(text) {
            if json.is_object() || json.is_array() {
                return CellValue::Json(json);
            }
        }
    }

    CellValue::Text(text.to_string())
}

/// Parses a date from any of the common textual forms.
///
/// Used when a text cell is compared against a date filter value.
pub fn parse_date_lenient(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(date) = parse_stored_date(trimmed) {
        return Some(date);
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(day) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return day
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }
    None
}

fn parse_stored_date(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(text.trim(), DATE_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc2822(text.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

/// Locale-independent decimal parse. Words like `inf` or `NaN` are not numbers.
fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let numeric_chars = trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !numeric_chars {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1.0e15 {
        // -0.0 prints as "0"
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn is_bracketed(text: &str) -> bool {
    (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'))
}

/// Rebuilds a JSON value with every object's keys sorted.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_stringify_scalars() {
        assert_eq!(stringify(&CellValue::Null), "");
        assert_eq!(stringify(&CellValue::Bool(false)), "false");
        assert_eq!(stringify(&CellValue::Number(30.0)), "30");
        assert_eq!(stringify(&CellValue::Number(2.5)), "2.5");
        assert_eq!(stringify(&CellValue::Number(-0.0)), "0");
        assert_eq!(stringify(&CellValue::text("Ann")), "Ann");
    }

    #[test]
    fn test_stringify_date() {
        let date = Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap();
        assert_eq!(
            stringify(&CellValue::Date(date)),
            "Tue, 15 Nov 1994 08:12:31 GMT"
        );
    }

    #[test]
    fn test_object_keys_sorted() {
        let a = stringify(&CellValue::Json(json!({"b": 1, "a": 2})));
        let b = stringify(&CellValue::Json(json!({"a": 2, "b": 1})));
        assert_eq!(a, b);
        assert_eq!(a, r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_arrays_of_objects_sorted() {
        let text = stringify(&CellValue::Json(json!([{"z": 1, "y": {"d": 1, "c": 2}}])));
        assert_eq!(text, r#"[{"y":{"c":2,"d":1},"z":1}]"#);
    }

    #[test]
    fn test_parse_priority() {
        assert_eq!(parse(""), CellValue::Null);
        assert_eq!(parse("TRUE"), CellValue::Bool(true));
        assert_eq!(parse("False"), CellValue::Bool(false));
        assert_eq!(parse("42"), CellValue::Number(42.0));
        assert_eq!(parse(" 4.5 "), CellValue::Number(4.5));
        assert_eq!(parse("1e3"), CellValue::Number(1000.0));
        assert_eq!(parse("inf"), CellValue::text("inf"));
        assert_eq!(parse("NaN"), CellValue::text("NaN"));
        assert_eq!(parse("[1,2]"), CellValue::Json(json!([1, 2])));
        assert_eq!(parse("{broken}"), CellValue::text("{broken}"));
        assert_eq!(parse("hello"), CellValue::text("hello"));
    }

    #[test]
    fn test_parse_date_requires_marker() {
        let parsed = parse("Tue, 15 Nov 1994 08:12:31 GMT");
        assert_eq!(
            parsed,
            CellValue::Date(Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap())
        );
        // No marker: stays text
        assert_eq!(parse("1994-11-15"), CellValue::text("1994-11-15"));
        // Marker but not a date
        assert_eq!(parse("GMT office"), CellValue::text("GMT office"));
    }

    #[test]
    fn test_round_trip_scalars() {
        for value in [
            CellValue::Bool(true),
            CellValue::Number(41.0),
            CellValue::Number(-3.25),
            CellValue::text("Bo"),
        ] {
            assert_eq!(parse(&stringify(&value)), value);
        }
    }

    #[test]
    fn test_lenient_date_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(parse_date_lenient("2024-01-05"), Some(expected));
        assert_eq!(parse_date_lenient("2024-01-05T00:00:00Z"), Some(expected));
        assert_eq!(parse_date_lenient("2024-01-05 00:00:00"), Some(expected));
        assert_eq!(parse_date_lenient("soon"), None);
    }
}
