use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Operand meaning "compare against null" rather than the literal string.
pub const NULL_SENTINEL: &str = "[isNull]";

const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Operand of a filter predicate after best-effort type inference.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Date(DateTime<Utc>),
    Text(String),
}

/// Infers the type of a raw query-string operand.
///
/// Tried in order: null sentinel, boolean literal, integer, finite float,
/// date. Anything else stays a string.
pub fn infer_value(raw: &str) -> Value {
    match raw {
        NULL_SENTINEL => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Text(raw.to_string());
    }
    if let Ok(n) = trimmed.parse::<i64>() {
        return Value::Integer(n);
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            return Value::Float(n);
        }
    }
    if let Some(date) = parse_date(trimmed) {
        return Value::Date(date);
    }
    Value::Text(raw.to_string())
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
