//! Value conversion utilities for bound query parameters.
//!
//! Bound values travel through the crate as SeaQuery [`Value`]s. This module
//! turns them into:
//! - `ToSql` trait objects for `may_postgres` ([`with_converted_params`])
//! - inline SQL literals for human-readable condition output ([`value_to_sql_string`])
//! - LIKE pattern text ([`value_to_pattern`])

use crate::session::SessionError;
use may_postgres::types::ToSql;
use sea_query::Value;

/// Convert SeaQuery values to may_postgres ToSql parameters.
///
/// The converted values are owned by this function; the closure receives
/// references that stay valid for the duration of the call.
///
/// # Errors
///
/// Returns `SessionError::Other` if an unsupported value type is encountered,
/// otherwise whatever the closure returns.
pub fn with_converted_params<F, R>(values: &[Value], f: F) -> Result<R, SessionError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, SessionError>,
{
    let mut owned: Vec<Box<dyn ToSql>> = Vec::with_capacity(values.len());

    for value in values {
        let param: Box<dyn ToSql> = match value {
            Value::Bool(b) => Box::new(*b),
            Value::TinyInt(i) => Box::new(i.map(i16::from)),
            Value::SmallInt(i) => Box::new(*i),
            Value::Int(i) => Box::new(*i),
            Value::BigInt(i) => Box::new(*i),
            Value::TinyUnsigned(u) => Box::new(u.map(i16::from)),
            Value::SmallUnsigned(u) => Box::new(u.map(i32::from)),
            Value::Unsigned(u) => Box::new(u.map(i64::from)),
            Value::BigUnsigned(Some(u)) => {
                let signed = i64::try_from(*u).map_err(|_| {
                    SessionError::Other(format!(
                        "BigUnsigned value {u} exceeds i64::MAX, cannot be bound"
                    ))
                })?;
                Box::new(signed)
            }
            Value::BigUnsigned(None) => Box::new(None::<i64>),
            Value::Float(v) => Box::new(*v),
            Value::Double(v) => Box::new(*v),
            Value::String(s) => Box::new(s.as_ref().map(|s| String::clone(s))),
            Value::Char(c) => Box::new(c.map(|c| c.to_string())),
            Value::Bytes(b) => Box::new(b.as_ref().map(|b| Vec::<u8>::clone(b))),
            Value::Json(Some(j)) => {
                let text = serde_json::to_string(&**j).map_err(|e| {
                    SessionError::Other(format!("Failed to serialize JSON: {e}"))
                })?;
                Box::new(text)
            }
            Value::Json(None) => Box::new(None::<String>),
            Value::Uuid(u) => Box::new(u.as_ref().map(|u| uuid::Uuid::clone(u))),
            Value::ChronoDate(d) => Box::new(d.as_ref().map(|d| chrono::NaiveDate::clone(d))),
            Value::ChronoDateTime(d) => {
                Box::new(d.as_ref().map(|d| chrono::NaiveDateTime::clone(d)))
            }
            Value::ChronoDateTimeUtc(d) => Box::new(
                d.as_ref()
                    .map(|d| chrono::DateTime::<chrono::Utc>::clone(d)),
            ),
            other => {
                return Err(SessionError::Other(format!(
                    "Unsupported value type in query: {other:?}"
                )));
            }
        };
        owned.push(param);
    }

    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref()).collect();
    f(&params)
}

/// Render a value as an inline SQL literal.
///
/// Strings are single-quoted with embedded quotes doubled; nulls become `NULL`.
pub fn value_to_sql_string(value: &Value) -> String {
    match value {
        Value::Bool(Some(b)) => {
            if *b {
                "TRUE".to_string()
            } else {
                "FALSE".to_string()
            }
        }
        Value::TinyInt(Some(i)) => i.to_string(),
        Value::SmallInt(Some(i)) => i.to_string(),
        Value::Int(Some(i)) => i.to_string(),
        Value::BigInt(Some(i)) => i.to_string(),
        Value::TinyUnsigned(Some(u)) => u.to_string(),
        Value::SmallUnsigned(Some(u)) => u.to_string(),
        Value::Unsigned(Some(u)) => u.to_string(),
        Value::BigUnsigned(Some(u)) => u.to_string(),
        Value::Float(Some(f)) => f.to_string(),
        Value::Double(Some(d)) => d.to_string(),
        Value::String(Some(s)) => quote(s),
        Value::Char(Some(c)) => quote(&c.to_string()),
        Value::Bytes(Some(b)) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            format!("'\\x{hex}'")
        }
        Value::Json(Some(j)) => quote(&j.to_string()),
        Value::Uuid(Some(u)) => quote(&u.to_string()),
        Value::ChronoDate(Some(d)) => quote(&d.to_string()),
        Value::ChronoDateTime(Some(d)) => quote(&d.to_string()),
        Value::ChronoDateTimeUtc(Some(d)) => quote(&d.to_rfc3339()),
        _ => "NULL".to_string(),
    }
}

/// Text of a value used as a LIKE operand
///
/// Returns `None` for nulls and for values that have no sensible text form.
pub fn value_to_pattern(value: &Value) -> Option<String> {
    match value {
        Value::String(Some(s)) => Some(String::clone(s)),
        Value::Char(Some(c)) => Some(c.to_string()),
        Value::TinyInt(Some(i)) => Some(i.to_string()),
        Value::SmallInt(Some(i)) => Some(i.to_string()),
        Value::Int(Some(i)) => Some(i.to_string()),
        Value::BigInt(Some(i)) => Some(i.to_string()),
        Value::TinyUnsigned(Some(u)) => Some(u.to_string()),
        Value::SmallUnsigned(Some(u)) => Some(u.to_string()),
        Value::Unsigned(Some(u)) => Some(u.to_string()),
        Value::BigUnsigned(Some(u)) => Some(u.to_string()),
        Value::Uuid(Some(u)) => Some(u.to_string()),
        _ => None,
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
