//! Recordwalk - Pipeline stages for the built-in query evaluator
//!
//! Only one stage form exists: `map(select(.field == literal))`, which keeps
//! the array elements whose `field` strictly equals the literal.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::QueryError;
use crate::expression::json_type_name;
use crate::literal::parse_literal;

fn select_eq_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^map\(\s*select\(\s*\.([A-Za-z_][A-Za-z0-9_]*)\s*==\s*(.+?)\s*\)\s*\)$")
            .expect("valid regex: map(select(...))")
    })
}

/// A parsed pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// `map(select(.field == value))`
    SelectEq { field: String, value: Value },
}

impl Stage {
    /// Parse the text of one stage (already trimmed of surrounding pipes).
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let text = text.trim();
        let caps = select_eq_regex()
            .captures(text)
            .ok_or_else(|| QueryError::UnsupportedStage(text.to_string()))?;

        Ok(Stage::SelectEq {
            field: caps[1].to_string(),
            value: parse_literal(&caps[2])?,
        })
    }

    /// Apply the stage to `input`, producing the next pipeline value.
    pub fn apply(&self, input: Value) -> Result<Value, QueryError> {
        match self {
            Stage::SelectEq { field, value } => {
                let items = match input {
                    Value::Array(items) => items,
                    other => {
                        return Err(QueryError::RequiresArray {
                            stage: self.to_string(),
                            actual: json_type_name(&other),
                        })
                    }
                };

                let kept = items
                    .into_iter()
                    .filter(|item| match item {
                        // a missing field reads as null, as in jq
                        Value::Object(map) => {
                            strict_eq(map.get(field.as_str()).unwrap_or(&Value::Null), value)
                        }
                        _ => false,
                    })
                    .collect();
                Ok(Value::Array(kept))
            }
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::SelectEq { field, value } => {
                write!(f, "map(select(.{} == {}))", field, value)
            }
        }
    }
}

/// Type-and-value equality. Numbers compare by value, so `1` matches `1.0`,
/// but `true` never matches `1` and `"1"` never matches `1`.
fn strict_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a == b
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                a == b
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_select_eq() {
        let stage = Stage::parse("map(select(.active == true))").unwrap();
        assert_eq!(
            stage,
            Stage::SelectEq {
                field: "active".into(),
                value: json!(true)
            }
        );

        let stage = Stage::parse(r#"map( select( .name=="bob" ) )"#).unwrap();
        assert_eq!(
            stage,
            Stage::SelectEq {
                field: "name".into(),
                value: json!("bob")
            }
        );
    }

    #[test]
    fn test_parse_rejects_other_stages() {
        for text in ["length", "map(.id)", "select(.a == 1)", "map(select(.a != 1))", "map(select(.a > 1))"] {
            assert!(
                matches!(Stage::parse(text), Err(QueryError::UnsupportedStage(_))),
                "{text} should be unsupported"
            );
        }
    }

    #[test]
    fn test_parse_bad_literal() {
        assert!(matches!(
            Stage::parse("map(select(.a == bob))"),
            Err(QueryError::UnsupportedLiteral(_))
        ));
    }

    #[test]
    fn test_apply_filters_by_strict_equality() {
        let input = json!([
            {"id": 1, "v": 1},
            {"id": 2, "v": "1"},
            {"id": 3, "v": true},
            {"id": 4, "v": 1.0},
            {"id": 5},
            7
        ]);
        let stage = Stage::parse("map(select(.v == 1))").unwrap();
        let out = stage.apply(input).unwrap();
        assert_eq!(out, json!([{"id": 1, "v": 1}, {"id": 4, "v": 1.0}]));
    }

    #[test]
    fn test_apply_missing_field_matches_null() {
        let input = json!([{"id": 1, "v": null}, {"id": 2}, {"id": 3, "v": 0}, null]);
        let stage = Stage::parse("map(select(.v == null))").unwrap();
        assert_eq!(
            stage.apply(input).unwrap(),
            json!([{"id": 1, "v": null}, {"id": 2}])
        );
    }

    #[test]
    fn test_apply_requires_array() {
        let stage = Stage::parse("map(select(.v == 1))").unwrap();
        let err = stage.apply(json!({"v": 1})).unwrap_err();
        assert!(matches!(err, QueryError::RequiresArray { actual: "object", .. }));
    }
}
