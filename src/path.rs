//! Recordwalk - Dot-path navigation into JSON documents
//!
//! A path is `.` (the whole document) or a chain of `.segment` steps, e.g.
//! `.data.users` or `.meta."build.info"`. Quoted segments may contain dots and
//! spaces. Only objects can be stepped into.

use serde_json::Value;

use crate::error::QueryError;

/// Split a path expression into its key segments.
///
/// `.` yields no segments. Quotes around a segment are stripped.
pub fn parse_path(expression: &str) -> Result<Vec<String>, QueryError> {
    let expression = expression.trim();
    let body = expression
        .strip_prefix('.')
        .ok_or_else(|| QueryError::UnsupportedExpression(expression.to_string()))?;

    if body.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = body.chars();

    while let Some(ch) = chars.next() {
        match ch {
            // a quote may only open a segment
            '"' if current.is_empty() && !quoted => {
                for inner in chars.by_ref() {
                    if inner == '"' {
                        quoted = true;
                        break;
                    }
                    current.push(inner);
                }
                if !quoted {
                    return Err(QueryError::UnsupportedExpression(format!(
                        "unterminated quote in path {}",
                        expression
                    )));
                }
            }
            '.' => {
                push_segment(expression, &mut segments, &mut current, quoted)?;
                quoted = false;
            }
            // nothing but `.` may follow a closing quote, and a quote
            // cannot appear inside a bare segment
            _ if quoted || ch == '"' => {
                return Err(QueryError::UnsupportedExpression(format!(
                    "misplaced quote in path {}",
                    expression
                )));
            }
            _ => current.push(ch),
        }
    }
    push_segment(expression, &mut segments, &mut current, quoted)?;

    Ok(segments)
}

fn push_segment(
    expression: &str,
    segments: &mut Vec<String>,
    current: &mut String,
    quoted: bool,
) -> Result<(), QueryError> {
    // `""` is a legitimate (empty) key, a bare empty step is not
    if current.is_empty() && !quoted {
        return Err(QueryError::UnsupportedExpression(format!(
            "empty segment in path {}",
            expression
        )));
    }
    segments.push(std::mem::take(current));
    Ok(())
}

/// Walk `segments` into `document`, returning the value found at the end.
pub fn resolve<'a>(document: &'a Value, segments: &[String]) -> Result<&'a Value, QueryError> {
    segments.iter().try_fold(document, |current, segment| {
        current
            .as_object()
            .and_then(|map| map.get(segment))
            .ok_or_else(|| QueryError::PathSegmentNotFound(segment.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_identity() {
        assert!(parse_path(".").unwrap().is_empty());
        assert!(parse_path("  .  ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_segments() {
        assert_eq!(parse_path(".a.b").unwrap(), vec!["a", "b"]);
        assert_eq!(
            parse_path(r#".a.b."c.d""#).unwrap(),
            vec!["a", "b", "c.d"]
        );
        assert_eq!(parse_path(r#"."first name""#).unwrap(), vec!["first name"]);
    }

    #[test]
    fn test_parse_rejects_malformed_paths() {
        assert!(matches!(
            parse_path("users"),
            Err(QueryError::UnsupportedExpression(_))
        ));
        assert!(parse_path(".a..b").is_err());
        assert!(parse_path(".a.").is_err());
        assert!(parse_path(r#"."open"#).is_err());
    }

    #[test]
    fn test_parse_rejects_quotes_inside_segments() {
        for text in [r#".a"b"c"#, r#"."a"b"#, r#".a."b"c"#, r#".ab""#] {
            assert!(
                matches!(parse_path(text), Err(QueryError::UnsupportedExpression(_))),
                "{text} should be rejected"
            );
        }
        assert_eq!(parse_path(r#"."".a"#).unwrap(), vec!["", "a"]);
    }

    #[test]
    fn test_resolve_nested() {
        let doc = json!({"a": {"b": {"c.d": [1, 2]}}});
        let segments = parse_path(r#".a.b."c.d""#).unwrap();
        assert_eq!(resolve(&doc, &segments).unwrap(), &json!([1, 2]));
        assert_eq!(resolve(&doc, &[]).unwrap(), &doc);
    }

    #[test]
    fn test_resolve_missing_or_not_indexable() {
        let doc = json!({"a": {"b": 1}, "list": [{"x": 1}]});

        let err = resolve(&doc, &parse_path(".a.z").unwrap()).unwrap_err();
        assert!(matches!(err, QueryError::PathSegmentNotFound(ref s) if s == "z"));

        // scalars and arrays cannot be stepped into
        assert!(resolve(&doc, &parse_path(".a.b.c").unwrap()).is_err());
        assert!(resolve(&doc, &parse_path(".list.x").unwrap()).is_err());
    }
}
