//! Recordwalk — Stateful record-by-record iteration over datasets.
//!
//! Loads a JSONL file, or the array a query selects from a JSON document,
//! and hands its records out one at a time while remembering the cursor and
//! any results saved along the way. Built to be driven by discrete requests
//! from an LLM client.
//!
//! ## Components
//!
//! - **Iteration engine** (`engine`) — dataset, cursor, saved results.
//! - **Query adapter** (`adapter`) — runs `jq` when installed, otherwise the
//!   built-in evaluator (`expression`, `path`, `stage`, `literal`).
//! - **MCP Server** (`mcp`) — exposes the engine as Tools/Resources via the
//!   Model Context Protocol (JSON-RPC over HTTP).

pub mod adapter;
pub mod engine;
pub mod error;
pub mod expression;
pub mod literal;
pub mod mcp;
pub mod path;
pub mod source;
pub mod stage;

pub use adapter::QueryAdapter;
pub use engine::{IterationEngine, LoadReport, ProcessingResult, RecordView, Status};
pub use error::{EngineError, QueryError};
