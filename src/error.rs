//! Recordwalk - Error types
//!
//! `QueryError` covers everything that can go wrong while resolving a query
//! expression against a JSON document. `EngineError` is what the iteration
//! engine's operations return; load and export failures wrap their cause.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures while resolving a query expression.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("path segment not found: {0}")]
    PathSegmentNotFound(String),

    #[error("stage `{stage}` requires array input, got {actual}")]
    RequiresArray { stage: String, actual: &'static str },

    #[error("unsupported stage: {0}")]
    UnsupportedStage(String),

    #[error("unsupported literal: {0}")]
    UnsupportedLiteral(String),

    #[error("query must return an array, got {actual}")]
    NotAnArray { actual: &'static str },

    #[error("failed to read JSON document {}", path.display())]
    DocumentRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON document {}", path.display())]
    DocumentParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to run query engine `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("query engine `{program}` exited with {status}: {stderr}")]
    External {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("query engine `{program}` produced invalid JSON")]
    Output {
        program: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("query engine `{program}` produced {count} values; wrap the query in [...] to collect them into one array")]
    MultipleOutputs { program: String, count: usize },
}

/// Failures surfaced by [`crate::engine::IterationEngine`] operations.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("dataset load failed for {}", path.display())]
    DatasetLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON dataset load failed for {}", path.display())]
    JsonDatasetLoad {
        path: PathBuf,
        #[source]
        source: QueryError,
    },

    #[error("no record is current; call next first")]
    NoRecordFetched,

    #[error("export to {} failed", path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("background load task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// Render an error together with its full `source()` chain on one line.
pub fn display_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        cause = inner.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_chain_includes_causes() {
        let err = EngineError::JsonDatasetLoad {
            path: PathBuf::from("data.json"),
            source: QueryError::NotAnArray { actual: "object" },
        };
        assert_eq!(
            display_chain(&err),
            "JSON dataset load failed for data.json: query must return an array, got object"
        );
    }

    #[test]
    fn test_load_error_keeps_io_cause() {
        let err = EngineError::DatasetLoad {
            path: PathBuf::from("missing.jsonl"),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file"),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "No such file");
    }
}
