//! Recordwalk - Literal parsing for filter conditions

use serde_json::{Number, Value};

use crate::error::QueryError;

/// Parse the right-hand side of a `select` condition into a JSON scalar.
///
/// Accepts `true`, `false`, `null`, a double-quoted string (taken verbatim,
/// no escape processing) or a number.
pub fn parse_literal(text: &str) -> Result<Value, QueryError> {
    let text = text.trim();
    match text {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        "null" => return Ok(Value::Null),
        _ => {}
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Ok(Value::String(text[1..text.len() - 1].to_string()));
    }

    parse_number(text)
        .map(Value::Number)
        .ok_or_else(|| QueryError::UnsupportedLiteral(text.to_string()))
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(n) = text.parse::<i64>() {
        return Some(Number::from(n));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Some(Number::from(n));
    }
    // from_f64 rejects NaN and infinities
    text.parse::<f64>().ok().and_then(Number::from_f64)
}
