//! Recordwalk - Built-in query expression evaluator
//!
//! Used when no external query engine is available. The grammar is a path
//! followed by zero or more pipe-separated stages:
//!
//! ```text
//! expression := path ( "|" stage )*
//! path       := "." | ( "." segment )+
//! segment    := name | '"' any-chars '"'
//! stage      := "map(select(." field "==" literal "))"
//! ```
//!
//! Anything outside this subset is rejected rather than approximated.

use serde_json::Value;

use crate::error::QueryError;
use crate::path::{parse_path, resolve};
use crate::stage::Stage;

/// A parsed query expression: where to look, then what to do with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub path: Vec<String>,
    pub stages: Vec<Stage>,
}

impl Expression {
    /// Parse a full query string.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let mut pieces = text.split('|').map(str::trim).filter(|piece| !piece.is_empty());

        let head = match pieces.next() {
            Some(head) if head.starts_with('.') => head,
            _ => return Err(QueryError::UnsupportedExpression(text.trim().to_string())),
        };

        Ok(Self {
            path: parse_path(head)?,
            stages: pieces.map(Stage::parse).collect::<Result<_, _>>()?,
        })
    }

    /// Run the expression against `document`.
    pub fn evaluate(&self, document: &Value) -> Result<Value, QueryError> {
        let start = resolve(document, &self.path)?.clone();
        self.stages
            .iter()
            .try_fold(start, |current, stage| stage.apply(current))
    }
}

/// Parse `expression` and evaluate it against `document`.
pub fn evaluate(document: &Value, expression: &str) -> Result<Value, QueryError> {
    Expression::parse(expression)?.evaluate(document)
}

/// JSON type name as jq reports it.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> Value {
        json!({
            "users": [
                {"id": 1, "active": true, "role": "admin"},
                {"id": 2, "active": false, "role": "user"},
                {"id": 3, "active": true, "role": "user"}
            ]
        })
    }

    #[test]
    fn test_filter_active_users() {
        let doc = json!({"users":[{"id":1,"active":true},{"id":2,"active":false}]});
        let out = evaluate(&doc, ".users | map(select(.active == true))").unwrap();
        assert_eq!(out, json!([{"id":1,"active":true}]));
    }

    #[test]
    fn test_identity_and_plain_path() {
        let doc = users();
        assert_eq!(evaluate(&doc, ".").unwrap(), doc);
        assert_eq!(evaluate(&doc, ".users").unwrap(), doc["users"]);
    }

    #[test]
    fn test_stages_apply_left_to_right() {
        let out = evaluate(
            &users(),
            r#".users | map(select(.active == true)) | map(select(.role == "user"))"#,
        )
        .unwrap();
        assert_eq!(out, json!([{"id": 3, "active": true, "role": "user"}]));
    }

    #[test]
    fn test_empty_pieces_are_dropped() {
        let out = evaluate(&users(), " .users || map(select(.id == 2)) | ").unwrap();
        assert_eq!(out, json!([{"id": 2, "active": false, "role": "user"}]));
    }

    #[test]
    fn test_quoted_segment() {
        let doc = json!({"meta": {"build.info": {"version": "1.2"}}});
        let out = evaluate(&doc, r#".meta."build.info".version"#).unwrap();
        assert_eq!(out, json!("1.2"));
    }

    #[test]
    fn test_rejects_missing_leading_dot() {
        for text in ["", "   ", "|", "users", "map(select(.a == 1))"] {
            assert!(
                matches!(
                    Expression::parse(text),
                    Err(QueryError::UnsupportedExpression(_))
                ),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_segment() {
        let err = evaluate(&users(), ".accounts").unwrap_err();
        assert!(matches!(err, QueryError::PathSegmentNotFound(ref s) if s == "accounts"));
    }

    #[test]
    fn test_stage_on_non_array() {
        let err = evaluate(&users(), ". | map(select(.id == 1))").unwrap_err();
        assert!(matches!(err, QueryError::RequiresArray { actual: "object", .. }));
    }

    #[test]
    fn test_unsupported_stage_is_reported() {
        let err = evaluate(&users(), ".users | length").unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedStage(ref s) if s == "length"));
    }
}
