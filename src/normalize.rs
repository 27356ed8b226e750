//! Value coercion for program rows.
//!
//! A malformed cell reads as the caller's default; it never fails the computation.

use chrono::NaiveDate;
use tracing::debug;

use crate::models::FieldValue;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d"];

/// Coerce a cell to an integer.
///
/// - `None` and `Null` return `default`.
/// - Reals are truncated toward zero.
/// - Text is trimmed and parsed; anything that is not an integer returns `default`.
pub fn parse_int(value: Option<&FieldValue>, default: i64) -> i64 {
    match value {
        None | Some(FieldValue::Null) => default,
        Some(FieldValue::Int(v)) => *v,
        Some(FieldValue::Real(v)) if v.is_finite() => v.trunc() as i64,
        Some(FieldValue::Real(v)) => {
            debug!(value = %v, "non-finite number coerced to default");
            default
        }
        Some(FieldValue::Text(s)) => match s.trim().parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                debug!(value = %s, "unparseable integer coerced to default");
                default
            }
        },
    }
}

pub fn parse_float(value: Option<&FieldValue>, default: f64) -> f64 {
    match value {
        None | Some(FieldValue::Null) => default,
        Some(FieldValue::Int(v)) => *v as f64,
        Some(FieldValue::Real(v)) => *v,
        Some(FieldValue::Text(s)) => match s.trim().parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                debug!(value = %s, "unparseable number coerced to default");
                default
            }
        },
    }
}

/// Parse a year-month-day date written with `-`, `.` or `/`.
///
/// Only text cells can hold dates; everything else, and any text matching
/// none of the formats, is "no date".
pub fn parse_date(value: Option<&FieldValue>) -> Option<NaiveDate> {
    let FieldValue::Text(s) = value? else {
        return None;
    };
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok());
    if parsed.is_none() {
        debug!(value = %s, "unrecognised date format");
    }
    parsed
}

/// True when the cell exists and is not blank; a zero counts as present.
pub fn is_present(value: Option<&FieldValue>) -> bool {
    value.is_some_and(|v| !v.is_blank())
}
