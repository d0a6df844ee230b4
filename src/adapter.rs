//! Recordwalk - External query engine adapter
//!
//! Delegates query evaluation to `jq` (or a compatible program) so the full
//! query language is available when installed. When the program cannot be
//! found at all, the built-in evaluator in [`crate::expression`] takes over.
//! Every other failure is returned to the caller unchanged.

use std::io;
use std::path::Path;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::error::QueryError;
use crate::expression;

/// Default external query program.
pub const DEFAULT_PROGRAM: &str = "jq";

/// Resolves query expressions against JSON documents on disk.
#[derive(Debug, Clone)]
pub struct QueryAdapter {
    /// External program to try first. `None` means built-in only.
    program: Option<String>,
}

impl Default for QueryAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl QueryAdapter {
    /// Delegate to `program`, falling back when it is not installed.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: Some(program.into()),
        }
    }

    /// Never delegate; always use the built-in evaluator.
    pub fn builtin_only() -> Self {
        Self { program: None }
    }

    /// The external program this adapter tries, if any.
    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    /// Resolve `expression` against the JSON document at `path`.
    pub async fn resolve(&self, path: &Path, expression: &str) -> Result<Value, QueryError> {
        let Some(program) = &self.program else {
            return resolve_builtin(path, expression).await;
        };

        match run_external(program, path, expression).await {
            Err(QueryError::Spawn { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!("`{}` not found, using built-in query evaluator", program);
                resolve_builtin(path, expression).await
            }
            other => other,
        }
    }
}

/// Load the whole document and evaluate with the built-in grammar.
pub async fn resolve_builtin(path: &Path, expression: &str) -> Result<Value, QueryError> {
    let document = load_document(path).await?;
    expression::evaluate(&document, expression)
}

/// Read and parse a single JSON document.
pub async fn load_document(path: &Path) -> Result<Value, QueryError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| QueryError::DocumentRead {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|source| QueryError::DocumentParse {
        path: path.to_path_buf(),
        source,
    })
}

async fn run_external(program: &str, path: &Path, expression: &str) -> Result<Value, QueryError> {
    let output = Command::new(program)
        .arg("-c")
        .arg(expression)
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| QueryError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(QueryError::External {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_output(program, &output.stdout)
}

/// The program must print a single JSON value; no output reads as `null`.
/// A stream of several values is rejected rather than gathered, so a query
/// like `.items[]` fails the same way whatever the data holds.
fn parse_output(program: &str, stdout: &[u8]) -> Result<Value, QueryError> {
    let mut values = serde_json::Deserializer::from_slice(stdout)
        .into_iter::<Value>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| QueryError::Output {
            program: program.to_string(),
            source,
        })?;

    match values.len() {
        0 => Ok(Value::Null),
        1 => Ok(values.remove(0)),
        count => Err(QueryError::MultipleOutputs {
            program: program.to_string(),
            count,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn users_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"users":[{{"id":1,"active":true}},{{"id":2,"active":false}}]}}"#
        )
        .unwrap();
        file
    }

    #[test]
    fn test_parse_output_shapes() {
        assert_eq!(parse_output("jq", b"").unwrap(), Value::Null);
        assert_eq!(parse_output("jq", b"[1,2]\n").unwrap(), json!([1, 2]));
        assert_eq!(parse_output("jq", b"1\n").unwrap(), json!(1));
        assert!(matches!(
            parse_output("jq", b"{oops"),
            Err(QueryError::Output { .. })
        ));
    }

    #[test]
    fn test_parse_output_rejects_value_streams() {
        let err = parse_output("jq", b"{\"a\":1}\n{\"a\":2}\n").unwrap_err();
        assert!(matches!(err, QueryError::MultipleOutputs { count: 2, .. }));
        assert!(err.to_string().contains("[...]"));
    }

    #[tokio::test]
    async fn test_builtin_only() {
        let file = users_file();
        let adapter = QueryAdapter::builtin_only();
        assert_eq!(adapter.program(), None);

        let value = adapter
            .resolve(file.path(), ".users | map(select(.active == true))")
            .await
            .unwrap();
        assert_eq!(value, json!([{"id": 1, "active": true}]));
    }

    #[tokio::test]
    async fn test_missing_program_falls_back() {
        let file = users_file();
        let adapter = QueryAdapter::new("recordwalk-test-no-such-query-engine");

        let value = adapter
            .resolve(file.path(), ".users | map(select(.id == 2))")
            .await
            .unwrap();
        assert_eq!(value, json!([{"id": 2, "active": false}]));
    }

    #[tokio::test]
    async fn test_other_spawn_failures_propagate() {
        // a directory exists but cannot be executed
        let dir = tempfile::tempdir().unwrap();
        let file = users_file();
        let adapter = QueryAdapter::new(dir.path().to_string_lossy());

        let err = adapter.resolve(file.path(), ".users").await.unwrap_err();
        match err {
            QueryError::Spawn { source, .. } => {
                assert_ne!(source.kind(), io::ErrorKind::NotFound)
            }
            other => panic!("expected spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_zero_exit_propagates() {
        let file = users_file();
        let adapter = QueryAdapter::new("false");

        let err = adapter.resolve(file.path(), ".users").await.unwrap_err();
        match err {
            QueryError::External { program, status, .. } => {
                assert_eq!(program, "false");
                assert!(!status.success());
            }
            other => panic!("expected external error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unparseable_output_propagates() {
        // echo prints its arguments: `-c .users <path>` is not JSON
        let file = users_file();
        let adapter = QueryAdapter::new("echo");

        let err = adapter.resolve(file.path(), ".users").await.unwrap_err();
        assert!(matches!(err, QueryError::Output { ref program, .. } if program == "echo"));
    }

    #[tokio::test]
    async fn test_fallback_reports_document_errors() {
        let adapter = QueryAdapter::builtin_only();
        let err = adapter
            .resolve(Path::new("/definitely/not/here.json"), ".")
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::DocumentRead { .. }));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = adapter.resolve(file.path(), ".").await.unwrap_err();
        assert!(matches!(err, QueryError::DocumentParse { .. }));
    }
}
