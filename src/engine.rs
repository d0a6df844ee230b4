//! Recordwalk Iteration Engine
//!
//! Holds one loaded dataset, a cursor into it and the results saved while
//! walking it. Designed to be driven by independent requests: every call
//! reads or updates the engine's own state and nothing else.
//!
//! # Lifecycle
//!
//! ```text
//!   load_*  ──▶  next ─▶ save_result ─▶ next ─▶ ... ─▶ export_results
//!     │            ▲
//!     │            └── reset / jump_to
//!     └── a new load replaces records, cursor and results at once
//! ```
//!
//! Loads are all-or-nothing: the replacement dataset is fully built before
//! any state changes, so a failed load leaves the previous one in place.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::adapter::QueryAdapter;
use crate::error::{EngineError, QueryError};
use crate::expression::json_type_name;
use crate::source::{read_line_delimited, SkippedLine};

// ─── Views ──────────────────────────────────────────────────────────────────

/// One record handed out by [`IterationEngine::next`].
#[derive(Debug, Serialize)]
pub struct RecordView<'a> {
    /// 1-based position of the record.
    pub record_number: usize,
    pub total: usize,
    pub record: &'a Value,
    /// `"<record_number>/<total>"`
    pub progress: String,
}

/// A caller-supplied result attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    /// `cursor - 1` at the time the result was saved.
    pub record_index: usize,
    pub result: String,
}

/// Snapshot of the engine's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub source: Option<String>,
    pub cursor: usize,
    pub total: usize,
    pub completed: usize,
    pub remaining: usize,
}

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Number of records now loaded.
    pub records: usize,
    /// Lines dropped because they were not valid JSON (line-delimited only).
    pub skipped: Vec<SkippedLine>,
}

// ─── Engine ─────────────────────────────────────────────────────────────────

/// Stateful cursor over a loaded dataset.
///
/// Not synchronized: share it behind a lock so calls are serialized.
#[derive(Debug, Default)]
pub struct IterationEngine {
    records: Vec<Value>,
    source: Option<String>,
    cursor: usize,
    results: Vec<ProcessingResult>,
    adapter: QueryAdapter,
}

impl IterationEngine {
    /// Create an empty engine using the default query adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `adapter` for [`IterationEngine::load_queried`].
    pub fn with_adapter(mut self, adapter: QueryAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    /// Load a newline-delimited JSON file. Unparseable lines are skipped and
    /// listed in the report.
    pub async fn load_line_delimited(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<LoadReport, EngineError> {
        let path = path.as_ref().to_path_buf();

        let parsed = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || read_line_delimited(path)).await?
        }
        .map_err(|source| EngineError::DatasetLoad {
            path: path.clone(),
            source,
        })?;

        for line in &parsed.skipped {
            warn!(
                "Skipping line {} of {}: {}",
                line.line_number,
                path.display(),
                line.reason
            );
        }

        let records = self.replace(&path, parsed.records);
        Ok(LoadReport {
            records,
            skipped: parsed.skipped,
        })
    }

    /// Load the array produced by running `expression` over the JSON document
    /// at `path`. Each array element becomes one record.
    pub async fn load_queried(
        &mut self,
        path: impl AsRef<Path>,
        expression: &str,
    ) -> Result<LoadReport, EngineError> {
        let path = path.as_ref().to_path_buf();

        let items = match self.adapter.resolve(&path, expression).await {
            Ok(Value::Array(items)) => items,
            Ok(other) => {
                return Err(EngineError::JsonDatasetLoad {
                    path,
                    source: QueryError::NotAnArray {
                        actual: json_type_name(&other),
                    },
                })
            }
            Err(source) => return Err(EngineError::JsonDatasetLoad { path, source }),
        };

        let records = self.replace(&path, items);
        Ok(LoadReport {
            records,
            skipped: Vec::new(),
        })
    }

    /// Swap in a fully built dataset, resetting cursor and results.
    fn replace(&mut self, path: &Path, records: Vec<Value>) -> usize {
        self.records = records;
        self.source = Some(path.display().to_string());
        self.cursor = 0;
        self.results.clear();

        info!(
            "Loaded {} records from {}",
            self.records.len(),
            path.display()
        );
        self.records.len()
    }

    /// Return the record under the cursor and advance, or `None` once
    /// every record has been handed out.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<RecordView<'_>> {
        let record = self.records.get(self.cursor)?;
        self.cursor += 1;

        let total = self.records.len();
        Some(RecordView {
            record_number: self.cursor,
            total,
            record,
            progress: format!("{}/{}", self.cursor, total),
        })
    }

    /// Attach `text` to the record just before the cursor (`cursor - 1`).
    ///
    /// Right after `next` that is the record it returned; after `reset` or
    /// `jump_to` it is whatever precedes the new cursor. Fails while the
    /// cursor is at 0. Saving twice for the same record appends two entries.
    pub fn save_result(&mut self, text: impl Into<String>) -> Result<(), EngineError> {
        let record_index = self
            .cursor
            .checked_sub(1)
            .ok_or(EngineError::NoRecordFetched)?;

        self.results.push(ProcessingResult {
            record_index,
            result: text.into(),
        });
        Ok(())
    }

    pub fn status(&self) -> Status {
        Status {
            source: self.source.clone(),
            cursor: self.cursor,
            total: self.records.len(),
            completed: self.results.len(),
            remaining: self.records.len() - self.cursor,
        }
    }

    pub fn has_more(&self) -> bool {
        self.cursor < self.records.len()
    }

    /// Rewind to the first record. Saved results are kept.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Move the cursor to `index` if it names an existing record.
    ///
    /// The exhausted position (`index == total`) is not a valid target.
    pub fn jump_to(&mut self, index: i64) -> bool {
        match usize::try_from(index) {
            Ok(index) if index < self.records.len() => {
                self.cursor = index;
                true
            }
            _ => false,
        }
    }

    /// Write all saved results to `path` as a pretty-printed JSON array,
    /// replacing the file. Returns the number of results written.
    pub async fn export_results(&self, path: impl AsRef<Path>) -> Result<usize, EngineError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let export_err = |source: std::io::Error| EngineError::Export {
            path: path.clone(),
            source,
        };

        let body = serde_json::to_vec_pretty(&self.results).map_err(|e| export_err(e.into()))?;
        tokio::fs::write(&path, body).await.map_err(export_err)?;

        info!("Exported {} results to {}", self.results.len(), path.display());
        Ok(self.results.len())
    }

    /// Results saved since the last load, in save order.
    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    /// Identifier of the loaded source, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
