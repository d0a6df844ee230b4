//! Recordwalk - MCP server for walking datasets one record at a time
//!
//! Starts the JSON-RPC endpoint, optionally with a dataset already loaded.

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recordwalk::adapter::{QueryAdapter, DEFAULT_PROGRAM};
use recordwalk::engine::IterationEngine;
use recordwalk::mcp::start_mcp_server;

/// Recordwalk - iterate over JSONL/JSON datasets through MCP tools
#[derive(FromArgs)]
struct Args {
    /// port for the JSON-RPC endpoint on 127.0.0.1 (default: 3917)
    #[argh(option, short = 'p', default = "3917")]
    port: u16,

    /// JSONL file to load at startup
    #[argh(option)]
    file: Option<String>,

    /// JSON document to load at startup (requires --query)
    #[argh(option)]
    json: Option<String>,

    /// query selecting the array of records from --json
    #[argh(option, short = 'q')]
    query: Option<String>,

    /// external query program to delegate to (default: jq)
    #[argh(option)]
    jq: Option<String>,

    /// never run an external query program; use the built-in evaluator
    #[argh(switch)]
    no_jq: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Args = argh::from_env();

    let adapter = if args.no_jq {
        QueryAdapter::builtin_only()
    } else {
        QueryAdapter::new(args.jq.as_deref().unwrap_or(DEFAULT_PROGRAM))
    };
    let mut engine = IterationEngine::new().with_adapter(adapter);

    match (&args.file, &args.json, &args.query) {
        (Some(_), Some(_), _) => bail!("--file and --json cannot be used together"),
        (Some(file), None, _) => {
            let report = engine
                .load_line_delimited(file)
                .await
                .with_context(|| format!("Failed to load dataset: {}", file))?;
            info!(
                "Loaded {} records ({} lines skipped)",
                report.records,
                report.skipped.len()
            );
        }
        (None, Some(json), Some(query)) => {
            let report = engine
                .load_queried(json, query)
                .await
                .with_context(|| format!("Failed to load JSON dataset: {}", json))?;
            info!("Loaded {} records", report.records);
        }
        (None, Some(_), None) => bail!("--json requires --query"),
        (None, None, Some(_)) => bail!("--query requires --json"),
        (None, None, _) => {}
    }

    start_mcp_server(engine, args.port).await
}
