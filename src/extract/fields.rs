//! Typed optional-chaining accessors over raw JSON payloads
//!
//! Partial data is expected and tolerated: a missing or type-mismatched
//! path yields `None`, never an error. Paths use the JSON-pointer syntax
//! (`/ad/vehicle/make`).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

pub fn get<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    match root.pointer(path) {
        Some(Value::Null) | None => None,
        Some(value) => Some(value),
    }
}

/// Non-empty trimmed string at `path`.
pub fn get_str(root: &Value, path: &str) -> Option<String> {
    let text = get(root, path)?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Integer at `path`. Sites are inconsistent about numeric encoding, so
/// string-encoded integers and whole floats are accepted too.
pub fn get_i64(root: &Value, path: &str) -> Option<i64> {
    match get(root, path)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn get_f64(root: &Value, path: &str) -> Option<f64> {
    match get(root, path)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn get_bool(root: &Value, path: &str) -> Option<bool> {
    match get(root, path)? {
        Value::Bool(b) => Some(*b),
        // Persisted flags sometimes come back as 0/1
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// Timestamp at `path`, accepting RFC 3339 or the site's naive
/// `YYYY-MM-DDTHH:MM:SS[.fff]` form (read as UTC).
pub fn get_datetime(root: &Value, path: &str) -> Option<DateTime<Utc>> {
    let text = get_str(root, path)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&text, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_null_paths_yield_none() {
        let doc = json!({"ad": {"title": null}});
        assert_eq!(get_str(&doc, "/ad/title"), None);
        assert_eq!(get_str(&doc, "/ad/nope"), None);
        assert_eq!(get_i64(&doc, "/nope/deeper"), None);
    }

    #[test]
    fn test_get_str_trims_and_rejects_empty() {
        let doc = json!({"name": "  Meuri Ocasion  ", "blank": "   "});
        assert_eq!(get_str(&doc, "/name").as_deref(), Some("Meuri Ocasion"));
        assert_eq!(get_str(&doc, "/blank"), None);
    }

    #[test]
    fn test_get_i64_accepts_strings_and_whole_floats() {
        let doc = json!({"a": 42, "b": "42", "c": 42.0, "d": 42.5, "e": "x"});
        assert_eq!(get_i64(&doc, "/a"), Some(42));
        assert_eq!(get_i64(&doc, "/b"), Some(42));
        assert_eq!(get_i64(&doc, "/c"), Some(42));
        assert_eq!(get_i64(&doc, "/d"), None);
        assert_eq!(get_i64(&doc, "/e"), None);
    }

    #[test]
    fn test_get_bool_accepts_numeric_flags() {
        let doc = json!({"a": true, "b": 0, "c": 1, "d": "yes"});
        assert_eq!(get_bool(&doc, "/a"), Some(true));
        assert_eq!(get_bool(&doc, "/b"), Some(false));
        assert_eq!(get_bool(&doc, "/c"), Some(true));
        assert_eq!(get_bool(&doc, "/d"), None);
    }

    #[test]
    fn test_get_datetime_formats() {
        let doc = json!({
            "rfc": "2023-03-24T19:01:46+01:00",
            "naive": "2023-03-23T20:01:34.000001",
            "junk": "yesterday"
        });
        assert!(get_datetime(&doc, "/rfc").is_some());
        assert!(get_datetime(&doc, "/naive").is_some());
        assert!(get_datetime(&doc, "/junk").is_none());
    }
}
